use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-segment transcription state machine.
///
/// Transitions:
/// - Pending -> Queued (network unavailable at enqueue time)
/// - Pending -> Processing (dispatched to a provider)
/// - Queued -> Processing (connectivity restored, re-dispatch)
/// - Processing -> Completed (provider returned text)
/// - Processing -> Pending (transient failure, retry scheduled)
/// - Pending -> Failed (retry budget exhausted)
/// - Failed -> Processing (manual retry or last-resort local pass)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    /// Awaiting dispatch.
    Pending,
    /// Held back because the network was unreachable at enqueue time.
    Queued,
    /// In flight to a provider.
    Processing,
    /// Transcription persisted; terminal.
    Completed,
    /// Retry budget exhausted; terminal unless manually re-queued.
    Failed,
}

impl SegmentStatus {
    /// Whether a dispatch may start from this state.
    ///
    /// Processing is excluded so a segment is never in flight twice, and
    /// Completed is final.
    #[must_use]
    pub fn can_dispatch(&self) -> bool {
        matches!(
            self,
            SegmentStatus::Pending | SegmentStatus::Queued | SegmentStatus::Failed
        )
    }

    /// Whether this state ends the segment's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentStatus::Completed | SegmentStatus::Failed)
    }
}

/// One completed recording, owning its segments through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// The full recording artifact the segmenter cuts from.
    pub audio_path: PathBuf,
}

impl Session {
    pub fn new(title: impl Into<String>, audio_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: Utc::now(),
            audio_path,
        }
    }
}

/// One fixed-duration slice of a session's audio, the unit of
/// transcription work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    /// Back-reference to the owning session; ownership lives with the
    /// session record, not here.
    pub session_id: Uuid,
    /// Start offset in seconds from the beginning of the recording.
    pub start_time: f64,
    /// End offset in seconds; always greater than `start_time`.
    pub end_time: f64,
    /// Present once the segment completes.
    pub transcription: Option<String>,
    pub status: SegmentStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// The slice artifact; deleted after the transcription is persisted.
    pub audio_path: PathBuf,
}

impl Segment {
    pub fn new(session_id: Uuid, start_time: f64, end_time: f64, audio_path: PathBuf) -> Self {
        debug_assert!(start_time < end_time);
        Self {
            id: Uuid::new_v4(),
            session_id,
            start_time,
            end_time,
            transcription: None,
            status: SegmentStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            audio_path,
        }
    }
}

/// Which backend produced a transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSource {
    Remote,
    Local,
}

/// Transient result of one provider call; never persisted as-is, only used
/// to transition a segment into Completed.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub segment_id: Uuid,
    pub text: String,
    pub confidence: Option<f32>,
    pub source: ProviderSource,
}

/// Aggregate transcription for a set of segments: completed segments' text,
/// ordered by start time, joined with single spaces. Non-completed segments
/// contribute nothing.
pub fn full_transcription(segments: &[Segment]) -> String {
    let mut completed: Vec<&Segment> = segments
        .iter()
        .filter(|s| s.status == SegmentStatus::Completed)
        .collect();
    completed.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    completed
        .iter()
        .filter_map(|s| s.transcription.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_with(start: f64, text: Option<&str>, status: SegmentStatus) -> Segment {
        let mut segment = Segment::new(Uuid::new_v4(), start, start + 10.0, PathBuf::from("/tmp/a.wav"));
        segment.transcription = text.map(String::from);
        segment.status = status;
        segment
    }

    #[test]
    fn test_status_can_dispatch() {
        assert!(SegmentStatus::Pending.can_dispatch());
        assert!(SegmentStatus::Queued.can_dispatch());
        assert!(SegmentStatus::Failed.can_dispatch());
        assert!(!SegmentStatus::Processing.can_dispatch());
        assert!(!SegmentStatus::Completed.can_dispatch());
    }

    #[test]
    fn test_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&SegmentStatus::Pending).unwrap(),
            "\"pending\""
        );
        let status: SegmentStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, SegmentStatus::Queued);
    }

    #[test]
    fn test_full_transcription_sorts_by_start_time() {
        let later = segment_with(10.0, Some("B"), SegmentStatus::Completed);
        let earlier = segment_with(0.0, Some("A"), SegmentStatus::Completed);

        // Inserted out of order on purpose.
        assert_eq!(full_transcription(&[later, earlier]), "A B");
    }

    #[test]
    fn test_full_transcription_skips_non_completed() {
        let completed = segment_with(0.0, Some("hello"), SegmentStatus::Completed);
        let failed = segment_with(10.0, None, SegmentStatus::Failed);
        let processing = segment_with(20.0, Some("partial"), SegmentStatus::Processing);

        assert_eq!(full_transcription(&[completed, failed, processing]), "hello");
    }

    #[test]
    fn test_full_transcription_empty_set() {
        assert_eq!(full_transcription(&[]), "");
    }
}
