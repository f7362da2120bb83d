use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Transcription pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Fixed segment length in seconds; the last segment of a recording is
    /// shorter.
    pub segment_duration_secs: f64,
    /// Retry budget per segment before it is marked failed.
    pub max_retries: u32,
    /// Run the signal conditioner on each segment before dispatch.
    pub preprocessing: bool,
    /// Per-call provider timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum provider calls in flight at once.
    pub batch_size: usize,
    /// Skip dispatching segments with no detected voice activity.
    pub vad_gating: bool,
    /// Allow falling back to the local engine.
    pub local_fallback: bool,
    /// Consecutive provider failures before the pipeline switches to the
    /// local engine for all subsequent dispatches.
    pub fallback_threshold: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: 30.0,
            max_retries: 5,
            preprocessing: true,
            request_timeout_secs: 30,
            batch_size: 3,
            vad_gating: true,
            local_fallback: true,
            fallback_threshold: 5,
        }
    }
}

/// Remote transcription provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteProviderConfig {
    /// OpenAI-style transcriptions endpoint.
    pub endpoint: String,
    /// Bearer token; requests fail with a configuration error when absent.
    pub api_key: Option<String>,
    /// Model identifier sent with each upload.
    pub model: String,
    /// Response format requested from the provider.
    pub response_format: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Target language hint (ISO 639-1); omitted when None.
    pub language: Option<String>,
}

impl Default for RemoteProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            response_format: "json".to_string(),
            temperature: 0.0,
            language: None,
        }
    }
}

/// Local transcription engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LocalProviderConfig {
    /// Path to a whisper ggml model; the engine reports itself unavailable
    /// when unset.
    pub model_path: Option<PathBuf>,
    /// Number of inference threads (0 = auto).
    pub threads: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
    /// Maximum number of log files to keep.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            max_files: 7,
        }
    }
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for segment artifacts; defaults to `segments/` under the
    /// application data directory.
    pub segments_dir: Option<PathBuf>,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub transcription: TranscriptionConfig,
    pub remote: RemoteProviderConfig,
    pub local: LocalProviderConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_config_defaults() {
        let config = TranscriptionConfig::default();
        assert!((config.segment_duration_secs - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.fallback_threshold, 5);
        assert_eq!(config.batch_size, 3);
        assert!(config.preprocessing);
        assert!(config.local_fallback);
    }

    #[test]
    fn test_remote_config_defaults() {
        let config = RemoteProviderConfig::default();
        assert_eq!(config.model, "whisper-1");
        assert_eq!(config.response_format, "json");
        assert!(config.api_key.is_none());
        assert!(config.language.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [transcription]
            max_retries = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.transcription.max_retries, 2);
        assert!((config.transcription.segment_duration_secs - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
    }
}
