use std::path::Path;

use hound::{SampleFormat, WavReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::{AudioBuffer, DomainError, Segment, Session};

/// Cuts a completed recording into fixed-duration segment artifacts.
///
/// Descriptors are emitted through the returned channel as soon as their
/// slice is durable on disk, so the first segment can be dispatched while
/// the rest of the recording is still being cut. An I/O failure is sent as
/// the final item and aborts the remaining cuts — partial segmentation is
/// surfaced, never swallowed.
pub struct Segmenter {
    segment_duration_secs: f64,
}

impl Segmenter {
    pub fn new(segment_duration_secs: f64) -> Self {
        debug_assert!(segment_duration_secs > 0.0);
        Self {
            segment_duration_secs,
        }
    }

    /// Cut `session`'s recording into artifacts under `segments_dir`.
    ///
    /// Slicing runs on a blocking task; the receiver yields each segment
    /// descriptor in start-time order. Artifacts are named
    /// `segment-<session-id>-<index>.wav`, indices from 0.
    pub fn run(
        &self,
        session: &Session,
        segments_dir: &Path,
    ) -> mpsc::Receiver<Result<Segment, DomainError>> {
        let (tx, rx) = mpsc::channel(16);
        let duration = self.segment_duration_secs;
        let session_id = session.id;
        let recording = session.audio_path.clone();
        let dir = segments_dir.to_path_buf();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = cut_recording(&recording, session_id, &dir, duration, &tx) {
                error!(session_id = %session_id, error = %e, "Segmentation aborted");
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }
}

fn cut_recording(
    recording: &Path,
    session_id: Uuid,
    segments_dir: &Path,
    segment_duration_secs: f64,
    tx: &mpsc::Sender<Result<Segment, DomainError>>,
) -> Result<(), DomainError> {
    std::fs::create_dir_all(segments_dir)?;

    let mut reader = WavReader::open(recording)
        .map_err(|e| DomainError::Io(format!("failed to open {}: {}", recording.display(), e)))?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;
    let total_frames = reader.duration() as u64;
    let total_duration = total_frames as f64 / sample_rate as f64;
    let frames_per_segment = (segment_duration_secs * sample_rate as f64) as u64;

    info!(
        session_id = %session_id,
        total_duration_secs = total_duration,
        segment_duration_secs = segment_duration_secs,
        "Segmenting recording"
    );

    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => {
            let samples = reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32));
            cut_frames(
                samples,
                session_id,
                segments_dir,
                sample_rate,
                channels,
                total_frames,
                frames_per_segment,
                segment_duration_secs,
                total_duration,
                tx,
            )
        }
        (SampleFormat::Float, 32) => {
            let samples = reader.samples::<f32>();
            cut_frames(
                samples,
                session_id,
                segments_dir,
                sample_rate,
                channels,
                total_frames,
                frames_per_segment,
                segment_duration_secs,
                total_duration,
                tx,
            )
        }
        (format, bits) => Err(DomainError::AudioFormat(format!(
            "unsupported recording encoding: {:?} at {} bits",
            format, bits
        ))),
    }
}

#[allow(clippy::too_many_arguments)]
fn cut_frames(
    mut samples: impl Iterator<Item = Result<f32, hound::Error>>,
    session_id: Uuid,
    segments_dir: &Path,
    sample_rate: u32,
    channels: u16,
    total_frames: u64,
    frames_per_segment: u64,
    segment_duration_secs: f64,
    total_duration: f64,
    tx: &mpsc::Sender<Result<Segment, DomainError>>,
) -> Result<(), DomainError> {
    let mut current_frame = 0u64;
    let mut index = 0u32;

    while current_frame < total_frames {
        let frames_to_read = frames_per_segment.min(total_frames - current_frame);
        let sample_count = (frames_to_read * channels as u64) as usize;

        let mut slice = Vec::with_capacity(sample_count);
        for _ in 0..sample_count {
            match samples.next() {
                Some(Ok(sample)) => slice.push(sample),
                Some(Err(e)) => {
                    return Err(DomainError::Io(format!("failed to read recording: {}", e)))
                }
                None => break,
            }
        }
        if slice.is_empty() {
            break;
        }

        // The artifact must be durable before its descriptor is handed out.
        let artifact_path = segments_dir.join(format!("segment-{}-{}.wav", session_id, index));
        AudioBuffer::from_samples(slice, sample_rate, channels).write_wav_file(&artifact_path)?;

        let start_time = current_frame as f64 / sample_rate as f64;
        let end_time = (start_time + segment_duration_secs).min(total_duration);
        let segment = Segment::new(session_id, start_time, end_time, artifact_path);

        debug!(
            session_id = %session_id,
            index = index,
            start_time = start_time,
            end_time = end_time,
            "Segment written"
        );

        if tx.blocking_send(Ok(segment)).is_err() {
            // Receiver gone; nothing left to cut for.
            return Ok(());
        }

        current_frame += frames_to_read;
        index += 1;
    }

    Ok(())
}
