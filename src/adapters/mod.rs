pub mod config_store;
pub mod local_whisper;
pub mod memory_store;
pub mod reachability;
pub mod remote_openai;

pub use config_store::TomlConfigStore;
pub use local_whisper::LocalWhisperProvider;
pub use memory_store::MemorySegmentStore;
pub use reachability::WatchReachabilityMonitor;
pub use remote_openai::RemoteOpenAiProvider;
