pub mod controller;
pub mod orchestrator;
pub mod segmenter;

pub use controller::PipelineController;
pub use orchestrator::{Orchestrator, PipelineEvent, PipelineSnapshot};
pub use segmenter::Segmenter;
