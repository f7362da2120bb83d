use thiserror::Error;

/// Domain-level errors for SegScribe.
///
/// The retry/backoff policy treats transport-level provider failures as
/// recoverable and everything that needs operator attention (credentials,
/// unusable engine, broken artifacts) as terminal for the affected segment.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    ResponseFormat(String),

    #[error("Recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Store constraint violated: {0}")]
    Constraint(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Audio data error: {0}")]
    AudioData(String),
}

impl DomainError {
    /// Whether the retry/backoff policy may re-dispatch after this error.
    ///
    /// Transient provider failures consume retry budget; everything else
    /// marks the segment failed on the first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::Network(_)
                | DomainError::ResponseFormat(_)
                | DomainError::Transcription(_)
        )
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<hound::Error> for DomainError {
    fn from(err: hound::Error) -> Self {
        DomainError::AudioFormat(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::ResponseFormat(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(DomainError::Network("timeout".into()).is_retryable());
        assert!(DomainError::ResponseFormat("no text field".into()).is_retryable());
        assert!(DomainError::Transcription("inference failed".into()).is_retryable());
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(!DomainError::Configuration("missing key".into()).is_retryable());
        assert!(!DomainError::EngineUnavailable("no model".into()).is_retryable());
        assert!(!DomainError::Io("disk full".into()).is_retryable());
        assert!(!DomainError::AudioFormat("bad rate".into()).is_retryable());
        assert!(!DomainError::AudioData("no channels".into()).is_retryable());
    }
}
