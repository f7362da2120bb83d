use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::domain::{
    AudioBuffer, DomainError, ProviderSource, RemoteProviderConfig, TranscriptionResult,
};
use crate::ports::TranscriptionProvider;

/// Expected response shape; anything without a `text` field is a
/// malformed-response error.
#[derive(Debug, Deserialize)]
struct RemoteTranscriptionResponse {
    text: String,
}

/// Remote transcription provider speaking the OpenAI-style
/// `/audio/transcriptions` multipart protocol.
///
/// Does not retry internally; transport and provider failures are reported
/// with the taxonomy the orchestrator's retry policy keys off.
pub struct RemoteOpenAiProvider {
    client: Client,
    config: RemoteProviderConfig,
}

impl RemoteOpenAiProvider {
    /// Create a provider with a per-call timeout.
    ///
    /// Fails fast on an endpoint that is not a valid URL; a missing API key
    /// is deferred to call time so the pipeline can start without
    /// credentials and surface the configuration error per segment.
    pub fn new(config: RemoteProviderConfig, timeout: Duration) -> Result<Self, DomainError> {
        Url::parse(&config.endpoint).map_err(|e| {
            DomainError::Configuration(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;

        let client = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(format!("SegScribe/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DomainError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        info!(
            endpoint = %config.endpoint,
            model = %config.model,
            timeout_secs = timeout.as_secs(),
            "RemoteOpenAiProvider created"
        );

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str, DomainError> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| DomainError::Configuration("API key not configured".to_string()))
    }

    fn build_form(&self, wav_bytes: Vec<u8>) -> Result<Form, DomainError> {
        let file_part = Part::bytes(wav_bytes)
            .file_name("segment.wav")
            .mime_str("audio/wav")
            .map_err(|e| {
                DomainError::Configuration(format!("failed to build multipart payload: {}", e))
            })?;

        let mut form = Form::new()
            .text("model", self.config.model.clone())
            .part("file", file_part)
            .text("response_format", self.config.response_format.clone())
            .text("temperature", self.config.temperature.to_string());

        if let Some(language) = self.config.language.as_deref() {
            if !language.is_empty() && language != "auto" {
                form = form.text("language", language.to_string());
            }
        }

        Ok(form)
    }
}

#[async_trait]
impl TranscriptionProvider for RemoteOpenAiProvider {
    async fn transcribe(
        &self,
        segment_id: Uuid,
        audio: &AudioBuffer,
    ) -> Result<TranscriptionResult, DomainError> {
        let api_key = self.api_key()?;
        let wav_bytes = audio.to_wav_bytes()?;
        let form = self.build_form(wav_bytes)?;

        debug!(
            segment_id = %segment_id,
            duration_secs = audio.duration_secs(),
            "Uploading segment to remote provider"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DomainError::Network(format!("transcription request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DomainError::Configuration(format!(
                "provider rejected credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(segment_id = %segment_id, status = %status, "Remote provider returned error");
            return Err(DomainError::Network(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let body: RemoteTranscriptionResponse = response
            .json()
            .await
            .map_err(|e| DomainError::ResponseFormat(format!("no text field in response: {}", e)))?;

        Ok(TranscriptionResult {
            segment_id,
            text: body.text.trim().to_string(),
            confidence: None,
            source: ProviderSource::Remote,
        })
    }

    fn source(&self) -> ProviderSource {
        ProviderSource::Remote
    }

    fn is_available(&self) -> bool {
        self.api_key().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Option<&str>) -> RemoteProviderConfig {
        RemoteProviderConfig {
            api_key: key.map(String::from),
            ..RemoteProviderConfig::default()
        }
    }

    #[test]
    fn test_invalid_endpoint_is_configuration_error() {
        let config = RemoteProviderConfig {
            endpoint: "not a url".to_string(),
            ..RemoteProviderConfig::default()
        };
        assert!(matches!(
            RemoteOpenAiProvider::new(config, Duration::from_secs(30)),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn test_availability_tracks_api_key() {
        let without = RemoteOpenAiProvider::new(config_with_key(None), Duration::from_secs(30))
            .unwrap();
        assert!(!without.is_available());

        let blank = RemoteOpenAiProvider::new(config_with_key(Some("  ")), Duration::from_secs(30))
            .unwrap();
        assert!(!blank.is_available());

        let with = RemoteOpenAiProvider::new(config_with_key(Some("sk-test")), Duration::from_secs(30))
            .unwrap();
        assert!(with.is_available());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_network_io() {
        let provider =
            RemoteOpenAiProvider::new(config_with_key(None), Duration::from_secs(30)).unwrap();
        let audio = AudioBuffer::from_samples(vec![0.1; 160], 16_000, 1);

        let result = provider.transcribe(Uuid::new_v4(), &audio).await;
        assert!(matches!(result, Err(DomainError::Configuration(_))));
    }

    #[test]
    fn test_response_shape_requires_text_field() {
        let ok: Result<RemoteTranscriptionResponse, _> =
            serde_json::from_str(r#"{"text": "hello"}"#);
        assert_eq!(ok.unwrap().text, "hello");

        let missing: Result<RemoteTranscriptionResponse, _> =
            serde_json::from_str(r#"{"transcript": "hello"}"#);
        assert!(missing.is_err());
    }
}
