pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod signal;

pub use audio::AudioBuffer;
pub use config::{
    AppConfig, LocalProviderConfig, LoggingConfig, RemoteProviderConfig, StorageConfig,
    TranscriptionConfig,
};
pub use error::DomainError;
pub use session::{
    full_transcription, ProviderSource, Segment, SegmentStatus, Session, TranscriptionResult,
};
