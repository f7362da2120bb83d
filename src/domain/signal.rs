use rubato::{FftFixedIn, Resampler};

use crate::domain::{AudioBuffer, DomainError};

/// Canonical provider format: 16 kHz mono.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// High-pass cutoff removing DC offset and low-frequency rumble without
/// touching the speech band.
const HIGHPASS_CUTOFF_HZ: f32 = 80.0;

/// Peak amplitude after normalization.
const NORMALIZE_TARGET: f32 = 0.8;

/// RMS energy threshold below which a buffer is considered silent.
const VAD_RMS_THRESHOLD: f32 = 0.002;

/// Fixed input chunk size for the FFT resampler.
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Condition a raw PCM buffer for transcription.
///
/// Downmixes to mono, resamples to [`TARGET_SAMPLE_RATE`], applies the
/// high-pass filter and normalizes the peak amplitude. Pure: the input
/// buffer is untouched.
pub fn preprocess(input: &AudioBuffer) -> Result<AudioBuffer, DomainError> {
    if input.channels() == 0 || input.is_empty() {
        return Err(DomainError::AudioData("no channel data present".to_string()));
    }

    let mono = downmix_to_mono(input);
    let resampled = resample(&mono, input.sample_rate(), TARGET_SAMPLE_RATE)?;
    let filtered = high_pass(&resampled, TARGET_SAMPLE_RATE);
    let normalized = normalize(&filtered);

    Ok(AudioBuffer::from_samples(normalized, TARGET_SAMPLE_RATE, 1))
}

/// Voice-activity detection over a whole buffer: RMS energy against a fixed
/// threshold. Used to skip dispatching segments that carry no speech.
pub fn has_voice(buffer: &AudioBuffer) -> bool {
    buffer.rms() > VAD_RMS_THRESHOLD
}

/// Average interleaved channels into a single mono channel.
fn downmix_to_mono(input: &AudioBuffer) -> Vec<f32> {
    let channels = input.channels() as usize;
    if channels == 1 {
        return input.samples().to_vec();
    }

    input
        .samples()
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono samples with a fixed-chunk FFT resampler.
///
/// The final partial chunk is zero-padded on input and trimmed on output so
/// the result does not grow a tail of synthetic silence.
fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>, DomainError> {
    if from_hz == to_hz {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from_hz as usize, to_hz as usize, RESAMPLER_CHUNK_SIZE, 1, 1)
            .map_err(|e| {
                DomainError::AudioFormat(format!(
                    "cannot resample {} Hz to {} Hz: {}",
                    from_hz, to_hz, e
                ))
            })?;

    let ratio = to_hz as f64 / from_hz as f64;
    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + 1);
    let mut pos = 0;

    while pos + RESAMPLER_CHUNK_SIZE <= samples.len() {
        let chunk = &samples[pos..pos + RESAMPLER_CHUNK_SIZE];
        let out = resampler
            .process(&[chunk], None)
            .map_err(|e| DomainError::AudioFormat(format!("resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
        pos += RESAMPLER_CHUNK_SIZE;
    }

    let remaining = samples.len() - pos;
    if remaining > 0 {
        let mut last = vec![0.0; RESAMPLER_CHUNK_SIZE];
        last[..remaining].copy_from_slice(&samples[pos..]);
        let out = resampler
            .process(&[&last], None)
            .map_err(|e| DomainError::AudioFormat(format!("resampling failed: {}", e)))?;
        let keep = ((remaining as f64 * ratio) as usize).min(out[0].len());
        output.extend_from_slice(&out[0][..keep]);
    }

    Ok(output)
}

/// Single-pole recursive high-pass filter:
/// `y[n] = alpha * (y[n-1] + x[n] - x[n-1])`.
fn high_pass(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let rc = 1.0 / (2.0 * std::f32::consts::PI * HIGHPASS_CUTOFF_HZ);
    let dt = 1.0 / sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut filtered = Vec::with_capacity(samples.len());
    let mut prev_input = 0.0f32;
    let mut prev_output = 0.0f32;

    for &sample in samples {
        let output = alpha * (prev_output + sample - prev_input);
        filtered.push(output);
        prev_input = sample;
        prev_output = output;
    }

    filtered
}

/// Scale every sample so the peak hits [`NORMALIZE_TARGET`]. A silent buffer
/// is left unscaled rather than amplified into noise.
fn normalize(samples: &[f32]) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak <= f32::EPSILON {
        return samples.to_vec();
    }

    let scale = NORMALIZE_TARGET / peak;
    samples.iter().map(|s| s * scale).collect()
}
