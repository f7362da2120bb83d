use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::domain::DomainError;

/// PCM audio held in memory as `f32` samples in the range [-1, 1].
///
/// Multi-channel audio is stored interleaved; the signal conditioner
/// downmixes to mono before anything is handed to a provider. On disk the
/// canonical artifact format is 16-bit integer WAV.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Create a new empty audio buffer.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
        }
    }

    /// Create a buffer from existing samples.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Append samples to the buffer.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Get the samples as a slice (interleaved when multi-channel).
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Get the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Get the number of samples across all channels.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Peak absolute amplitude, 0.0 for an empty buffer.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |max, s| max.max(s.abs()))
    }

    /// Root-mean-square energy over the whole buffer.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }

    /// Decode a WAV file into a buffer.
    ///
    /// Accepts 16-bit integer and 32-bit float WAV, the two encodings the
    /// capture layer and the segmenter produce.
    pub fn from_wav_file(path: &Path) -> Result<Self, DomainError> {
        let mut reader = WavReader::open(path)
            .map_err(|e| DomainError::Io(format!("failed to open {}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let samples: Result<Vec<f32>, hound::Error> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect(),
            (SampleFormat::Float, 32) => reader.samples::<f32>().collect(),
            (format, bits) => {
                return Err(DomainError::AudioFormat(format!(
                    "unsupported WAV encoding: {:?} at {} bits",
                    format, bits
                )))
            }
        };

        Ok(Self {
            samples: samples?,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    /// Write the buffer to a 16-bit integer WAV file.
    pub fn write_wav_file(&self, path: &Path) -> Result<(), DomainError> {
        let mut writer = WavWriter::create(path, self.wav_spec())
            .map_err(|e| DomainError::Io(format!("failed to create {}: {}", path.display(), e)))?;
        self.write_samples(&mut writer)?;
        writer
            .finalize()
            .map_err(|e| DomainError::Io(format!("failed to finalize {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Encode the buffer as 16-bit integer WAV bytes (for upload payloads).
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, DomainError> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, self.wav_spec())?;
        self.write_samples(&mut writer)?;
        writer.finalize()?;
        Ok(cursor.into_inner())
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    fn write_samples<W>(&self, writer: &mut WavWriter<W>) -> Result<(), DomainError>
    where
        W: std::io::Write + std::io::Seek,
    {
        for sample in &self.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_buffer_creation() {
        let buffer = AudioBuffer::new(16_000, 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.sample_rate(), 16_000);
        assert_eq!(buffer.channels(), 1);
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer::from_samples(vec![0.0; 16_000], 16_000, 1);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);

        // Interleaved stereo: same frame count, same duration.
        let stereo = AudioBuffer::from_samples(vec![0.0; 32_000], 16_000, 2);
        assert!((stereo.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_peak_and_rms() {
        let buffer = AudioBuffer::from_samples(vec![0.5, -0.25, 0.1], 16_000, 1);
        assert!((buffer.peak() - 0.5).abs() < 1e-6);

        let constant = AudioBuffer::from_samples(vec![0.1; 1024], 16_000, 1);
        assert!((constant.rms() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_wav_roundtrip_within_quantization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.wav");

        let original = AudioBuffer::from_samples(vec![0.0, 0.5, -0.5, 0.25], 8_000, 1);
        original.write_wav_file(&path).unwrap();

        let decoded = AudioBuffer::from_wav_file(&path).unwrap();
        assert_eq!(decoded.sample_rate(), 8_000);
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.samples().iter().zip(decoded.samples()) {
            // 16-bit quantization error bound.
            assert!((a - b).abs() < 1.0 / i16::MAX as f32 * 2.0);
        }
    }

    #[test]
    fn test_wav_bytes_header() {
        let buffer = AudioBuffer::from_samples(vec![0.0; 64], 16_000, 1);
        let bytes = buffer.to_wav_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }
}
