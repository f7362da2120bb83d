use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::DomainError;

/// Port for the audio capture/playback device layer.
///
/// Capture hardware is an external collaborator: the pipeline only needs a
/// source of finished recording artifacts and a sink for playback. No
/// hardware adapter ships with the crate; hosts bring their own and tests
/// inject fakes.
#[async_trait]
pub trait RecordingDevice: Send + Sync {
    /// Begin capturing a new recording.
    async fn start_recording(&self) -> Result<(), DomainError>;

    /// Stop capturing and return the path of the finished audio artifact.
    async fn stop_recording(&self) -> Result<PathBuf, DomainError>;

    /// Play back a completed recording from disk.
    async fn play(&self, path: &Path) -> Result<(), DomainError>;
}
