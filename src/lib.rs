#![forbid(unsafe_code)]

//! Segmented voice transcription pipeline.
//!
//! A completed recording is cut into fixed-length segments, each of which is
//! preprocessed and driven through a transcription provider. The pipeline
//! prefers a remote provider and degrades to a local on-device engine under
//! sustained failure, queueing work while offline and re-dispatching it when
//! connectivity returns.

pub mod adapters;
pub mod app;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use app::{Orchestrator, PipelineController, PipelineEvent, PipelineSnapshot, Segmenter};
pub use domain::{
    AppConfig, AudioBuffer, DomainError, ProviderSource, Segment, SegmentStatus, Session,
    TranscriptionResult,
};
pub use ports::{ReachabilityMonitor, RecordingDevice, SegmentStore, TranscriptionProvider};
