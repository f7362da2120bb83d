use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AudioBuffer, DomainError, ProviderSource, TranscriptionResult};

/// Port for transcription providers.
///
/// The pipeline is polymorphic over this interface only; the two shipped
/// implementations are a remote network API and a local on-device engine.
/// Implementations never retry internally — the whole retry/backoff policy
/// lives in the orchestrator so it stays testable without real providers.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe one segment's conditioned audio.
    ///
    /// `segment_id` tags the result so it can be routed back to the right
    /// segment regardless of completion order.
    async fn transcribe(
        &self,
        segment_id: Uuid,
        audio: &AudioBuffer,
    ) -> Result<TranscriptionResult, DomainError>;

    /// Which backend this provider is.
    fn source(&self) -> ProviderSource;

    /// Whether the provider can currently serve requests.
    ///
    /// For the remote provider this checks configuration; for the local
    /// engine it checks that a model is usable on this platform.
    fn is_available(&self) -> bool;
}
