use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::domain::signal::TARGET_SAMPLE_RATE;
use crate::domain::{
    AudioBuffer, DomainError, LocalProviderConfig, ProviderSource, TranscriptionResult,
};
use crate::ports::TranscriptionProvider;

/// On-device transcription provider backed by whisper.cpp via whisper-rs.
///
/// The model is loaded lazily on the first dispatch and kept resident for
/// the life of the provider. A missing or unloadable model is an
/// engine-unavailable error (terminal for the affected segment); inference
/// failures are transient and consume retry budget like remote failures.
pub struct LocalWhisperProvider {
    context: RwLock<Option<Arc<WhisperContext>>>,
    model_path: Option<PathBuf>,
    language: Option<String>,
    threads: u32,
}

impl LocalWhisperProvider {
    /// Create a provider from configuration; `language` is the pipeline's
    /// target language hint, passed straight to the engine when set.
    pub fn new(config: &LocalProviderConfig, language: Option<String>) -> Self {
        let threads = if config.threads == 0 {
            std::thread::available_parallelism()
                .map(|p| std::cmp::max(1, p.get() as u32 - 1))
                .unwrap_or(1)
        } else {
            config.threads
        };

        info!(
            model_path = ?config.model_path,
            threads = threads,
            "LocalWhisperProvider created"
        );

        Self {
            context: RwLock::new(None),
            model_path: config.model_path.clone(),
            language,
            threads,
        }
    }

    /// Get the resident model context, loading it on first use.
    async fn ensure_loaded(&self) -> Result<Arc<WhisperContext>, DomainError> {
        if let Some(ctx) = self.context.read().clone() {
            return Ok(ctx);
        }

        let path = self.model_path.clone().ok_or_else(|| {
            DomainError::EngineUnavailable("no local model configured".to_string())
        })?;
        if !path.exists() {
            return Err(DomainError::EngineUnavailable(format!(
                "model not found at {}",
                path.display()
            )));
        }

        info!(path = ?path, "Loading whisper model");
        let path_str = path.to_string_lossy().to_string();
        let ctx = tokio::task::spawn_blocking(move || {
            WhisperContext::new_with_params(&path_str, WhisperContextParameters::default())
                .map_err(|e| DomainError::EngineUnavailable(format!("failed to load model: {}", e)))
        })
        .await
        .map_err(|e| DomainError::EngineUnavailable(format!("model load task failed: {}", e)))??;

        let ctx = Arc::new(ctx);
        *self.context.write() = Some(ctx.clone());
        info!(path = ?path, "Whisper model loaded");
        Ok(ctx)
    }
}

#[async_trait]
impl TranscriptionProvider for LocalWhisperProvider {
    async fn transcribe(
        &self,
        segment_id: Uuid,
        audio: &AudioBuffer,
    ) -> Result<TranscriptionResult, DomainError> {
        // The conditioner always hands over canonical 16 kHz mono; anything
        // else is a broken artifact, not an engine problem.
        if audio.sample_rate() != TARGET_SAMPLE_RATE || audio.channels() != 1 {
            return Err(DomainError::AudioFormat(format!(
                "expected {} Hz mono, got {} Hz / {} channels",
                TARGET_SAMPLE_RATE,
                audio.sample_rate(),
                audio.channels()
            )));
        }

        if audio.is_empty() {
            return Ok(TranscriptionResult {
                segment_id,
                text: String::new(),
                confidence: None,
                source: ProviderSource::Local,
            });
        }

        let ctx = self.ensure_loaded().await?;
        let samples = audio.samples().to_vec();
        let threads = self.threads;
        let language = self.language.clone();

        debug!(
            segment_id = %segment_id,
            samples = samples.len(),
            threads = threads,
            "Starting local transcription"
        );

        let text = tokio::task::spawn_blocking(move || {
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_n_threads(threads as i32);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            if let Some(ref lang) = language {
                params.set_language(Some(lang));
            }

            let mut state = ctx.create_state().map_err(|e| {
                DomainError::Transcription(format!("failed to create whisper state: {}", e))
            })?;

            state
                .full(params, &samples)
                .map_err(|e| DomainError::Transcription(format!("inference failed: {}", e)))?;

            let num_segments = state.full_n_segments().map_err(|e| {
                DomainError::Transcription(format!("failed to read segment count: {}", e))
            })?;

            let mut text = String::new();
            for i in 0..num_segments {
                if let Ok(piece) = state.full_get_segment_text(i) {
                    text.push_str(&piece);
                }
            }

            Ok::<String, DomainError>(text.trim().to_string())
        })
        .await
        .map_err(|e| DomainError::Transcription(format!("inference task failed: {}", e)))??;

        debug!(segment_id = %segment_id, text_len = text.len(), "Local transcription complete");

        Ok(TranscriptionResult {
            segment_id,
            text,
            confidence: None,
            source: ProviderSource::Local,
        })
    }

    fn source(&self) -> ProviderSource {
        ProviderSource::Local
    }

    fn is_available(&self) -> bool {
        if self.context.read().is_some() {
            return true;
        }
        self.model_path.as_ref().is_some_and(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_engine_is_unavailable() {
        let provider = LocalWhisperProvider::new(&LocalProviderConfig::default(), None);
        assert!(!provider.is_available());
    }

    #[test]
    fn test_missing_model_file_is_unavailable() {
        let config = LocalProviderConfig {
            model_path: Some(PathBuf::from("/nonexistent/ggml-base.bin")),
            threads: 2,
        };
        let provider = LocalWhisperProvider::new(&config, None);
        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn test_transcribe_without_model_is_engine_unavailable() {
        let provider = LocalWhisperProvider::new(&LocalProviderConfig::default(), None);
        let audio = AudioBuffer::from_samples(vec![0.1; 1600], 16_000, 1);

        let result = provider.transcribe(Uuid::new_v4(), &audio).await;
        assert!(matches!(result, Err(DomainError::EngineUnavailable(_))));
    }

    #[tokio::test]
    async fn test_non_canonical_audio_is_rejected() {
        let provider = LocalWhisperProvider::new(&LocalProviderConfig::default(), None);
        let audio = AudioBuffer::from_samples(vec![0.1; 1600], 44_100, 1);

        let result = provider.transcribe(Uuid::new_v4(), &audio).await;
        assert!(matches!(result, Err(DomainError::AudioFormat(_))));
    }

    #[tokio::test]
    async fn test_empty_canonical_audio_yields_empty_text() {
        let provider = LocalWhisperProvider::new(&LocalProviderConfig::default(), None);
        let audio = AudioBuffer::new(16_000, 1);

        let result = provider.transcribe(Uuid::new_v4(), &audio).await.unwrap();
        assert!(result.text.is_empty());
        assert_eq!(result.source, ProviderSource::Local);
    }
}
