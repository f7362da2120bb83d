use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

use crate::adapters::{LocalWhisperProvider, RemoteOpenAiProvider, TomlConfigStore};
use crate::app::{Orchestrator, PipelineEvent, PipelineSnapshot, Segmenter};
use crate::domain::{AppConfig, DomainError, Session};
use crate::infrastructure::init_logging;
use crate::ports::{
    ConfigStore, ReachabilityMonitor, RecordingDevice, SegmentStore, TranscriptionProvider,
};

/// Wires the pipeline together and owns the session lifecycle.
///
/// The controller is the integration surface for hosts: it loads
/// configuration, boots logging, constructs the provider adapters and the
/// orchestrator, and turns a finished recording into a session whose
/// segments flow through the pipeline. Capture itself stays behind the
/// device port.
pub struct PipelineController {
    config: RwLock<AppConfig>,
    config_store: Option<Arc<TomlConfigStore>>,
    store: Arc<dyn SegmentStore>,
    device: Arc<dyn RecordingDevice>,
    orchestrator: Orchestrator,
    segmenter: Segmenter,
    segments_dir: PathBuf,
    _log_guard: Option<WorkerGuard>,
}

impl PipelineController {
    /// Initialize with the default TOML config store, file logging, and the
    /// shipped remote/local provider adapters.
    pub fn new(
        store: Arc<dyn SegmentStore>,
        device: Arc<dyn RecordingDevice>,
        reachability: Arc<dyn ReachabilityMonitor>,
    ) -> Result<Self, DomainError> {
        let config_store = Arc::new(TomlConfigStore::new()?);
        let config = config_store.load()?;

        let log_guard = init_logging(
            &config_store.logs_dir(),
            &config.logging.level,
            config.logging.file_logging,
            config.logging.max_files,
        )?;

        info!("SegScribe pipeline starting up");

        let timeout = Duration::from_secs(config.transcription.request_timeout_secs);
        let remote = Arc::new(RemoteOpenAiProvider::new(config.remote.clone(), timeout)?);
        let local = Arc::new(LocalWhisperProvider::new(
            &config.local,
            config.remote.language.clone(),
        ));
        let segments_dir = config
            .storage
            .segments_dir
            .clone()
            .unwrap_or_else(|| config_store.segments_dir());

        Self::build(
            config,
            Some(config_store),
            store,
            device,
            remote,
            local,
            reachability,
            segments_dir,
            log_guard,
        )
    }

    /// Fully injected construction for tests and embedders that manage
    /// their own configuration and logging.
    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        config: AppConfig,
        store: Arc<dyn SegmentStore>,
        device: Arc<dyn RecordingDevice>,
        remote: Arc<dyn TranscriptionProvider>,
        local: Arc<dyn TranscriptionProvider>,
        reachability: Arc<dyn ReachabilityMonitor>,
        segments_dir: PathBuf,
    ) -> Result<Self, DomainError> {
        Self::build(
            config,
            None,
            store,
            device,
            remote,
            local,
            reachability,
            segments_dir,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        config: AppConfig,
        config_store: Option<Arc<TomlConfigStore>>,
        store: Arc<dyn SegmentStore>,
        device: Arc<dyn RecordingDevice>,
        remote: Arc<dyn TranscriptionProvider>,
        local: Arc<dyn TranscriptionProvider>,
        reachability: Arc<dyn ReachabilityMonitor>,
        segments_dir: PathBuf,
        log_guard: Option<WorkerGuard>,
    ) -> Result<Self, DomainError> {
        fs::create_dir_all(&segments_dir)?;

        let orchestrator = Orchestrator::new(
            config.transcription.clone(),
            store.clone(),
            remote,
            local,
            reachability,
        );
        let segmenter = Segmenter::new(config.transcription.segment_duration_secs);

        Ok(Self {
            config: RwLock::new(config),
            config_store,
            store,
            device,
            orchestrator,
            segmenter,
            segments_dir,
            _log_guard: log_guard,
        })
    }

    /// Get the current configuration.
    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Update the configuration.
    ///
    /// The dispatch policy reads its settings at startup; changes here are
    /// persisted and picked up on the next start.
    pub fn update_config(&self, config: AppConfig) -> Result<(), DomainError> {
        if let Some(store) = &self.config_store {
            store.save(&config)?;
        }
        *self.config.write() = config;
        info!("Configuration updated");
        Ok(())
    }

    /// Begin capturing a new recording.
    pub async fn start_recording(&self) -> Result<(), DomainError> {
        self.device.start_recording().await
    }

    /// Stop capturing: create the session record, then cut and transcribe
    /// its segments in the background.
    ///
    /// Returns as soon as the session is durable; transcription never
    /// blocks the capture surface.
    pub async fn stop_recording(&self, title: impl Into<String>) -> Result<Session, DomainError> {
        let audio_path = self.device.stop_recording().await?;
        let session = Session::new(title, audio_path);
        self.store.insert_session(&session).await?;

        info!(session_id = %session.id, "Recording stopped, segmenting");

        let mut segments_rx = self.segmenter.run(&session, &self.segments_dir);
        let store = self.store.clone();
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            while let Some(item) = segments_rx.recv().await {
                match item {
                    Ok(segment) => {
                        // Record first; a slice that cannot be persisted is
                        // never handed to the pipeline.
                        if let Err(e) = store.insert_segment(&segment).await {
                            error!(
                                segment_id = %segment.id,
                                error = %e,
                                "Failed to persist segment record, not dispatching"
                            );
                            continue;
                        }
                        if let Err(e) = orchestrator.enqueue(segment).await {
                            error!(error = %e, "Failed to enqueue segment");
                        }
                    }
                    Err(e) => error!(error = %e, "Segmentation failed"),
                }
            }
        });

        Ok(session)
    }

    /// List all recorded sessions.
    pub async fn sessions(&self) -> Result<Vec<Session>, DomainError> {
        self.store.fetch_sessions().await
    }

    /// Play back a session's recording through the device layer.
    pub async fn play_session(&self, session_id: Uuid) -> Result<(), DomainError> {
        let session = self
            .store
            .fetch_session(session_id)
            .await?
            .ok_or_else(|| {
                DomainError::Constraint(format!("session {} does not exist", session_id))
            })?;
        self.device.play(&session.audio_path).await
    }

    /// Delete a session: cascade its segment records and reclaim every
    /// artifact, including the original recording.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<(), DomainError> {
        let session = self
            .store
            .fetch_session(session_id)
            .await?
            .ok_or_else(|| {
                DomainError::Constraint(format!("session {} does not exist", session_id))
            })?;

        let removed = self.store.remove_session(session_id).await?;
        for segment in &removed {
            if segment.audio_path.exists() {
                if let Err(e) = tokio::fs::remove_file(&segment.audio_path).await {
                    warn!(segment_id = %segment.id, error = %e, "Failed to remove segment artifact");
                }
            }
        }
        if session.audio_path.exists() {
            if let Err(e) = tokio::fs::remove_file(&session.audio_path).await {
                warn!(session_id = %session_id, error = %e, "Failed to remove recording artifact");
            }
        }

        info!(
            session_id = %session_id,
            segments = removed.len(),
            "Session deleted"
        );
        Ok(())
    }

    /// Re-admit persisted segments after a restart.
    pub async fn resume(&self) -> Result<(), DomainError> {
        let segments = self.store.fetch_all_segments().await?;
        self.orchestrator.resume(segments).await
    }

    /// Aggregate transcription for one session.
    pub async fn full_transcription(&self, session_id: Uuid) -> Result<String, DomainError> {
        self.orchestrator.full_transcription(session_id).await
    }

    /// Re-enqueue every failed segment.
    pub async fn retry_failed(&self) -> Result<(), DomainError> {
        self.orchestrator.retry_failed().await
    }

    /// Drop completed segments from the in-memory working set.
    pub async fn clear_completed(&self) -> Result<(), DomainError> {
        self.orchestrator.clear_completed().await
    }

    /// Current working set and processing flag.
    pub async fn snapshot(&self) -> Result<PipelineSnapshot, DomainError> {
        self.orchestrator.snapshot().await
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.orchestrator.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::adapters::{MemorySegmentStore, WatchReachabilityMonitor};
    use crate::domain::{
        AudioBuffer, ProviderSource, SegmentStatus, TranscriptionResult,
    };

    struct FakeDevice {
        recording: Mutex<Option<PathBuf>>,
        played: Mutex<Vec<PathBuf>>,
    }

    impl FakeDevice {
        fn with_recording(path: PathBuf) -> Arc<Self> {
            Arc::new(Self {
                recording: Mutex::new(Some(path)),
                played: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RecordingDevice for FakeDevice {
        async fn start_recording(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn stop_recording(&self) -> Result<PathBuf, DomainError> {
            self.recording
                .lock()
                .take()
                .ok_or_else(|| DomainError::Io("no recording in progress".to_string()))
        }

        async fn play(&self, path: &Path) -> Result<(), DomainError> {
            self.played.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    struct FixedProvider {
        source: ProviderSource,
        text: String,
    }

    #[async_trait]
    impl TranscriptionProvider for FixedProvider {
        async fn transcribe(
            &self,
            segment_id: Uuid,
            _audio: &AudioBuffer,
        ) -> Result<TranscriptionResult, DomainError> {
            Ok(TranscriptionResult {
                segment_id,
                text: self.text.clone(),
                confidence: Some(0.9),
                source: self.source,
            })
        }

        fn source(&self) -> ProviderSource {
            self.source
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn write_recording(path: &Path, secs: f64) {
        let count = (secs * 16_000.0) as usize;
        AudioBuffer::from_samples(vec![0.1; count], 16_000, 1)
            .write_wav_file(path)
            .unwrap();
    }

    fn test_controller(
        dir: &Path,
        device: Arc<FakeDevice>,
        store: Arc<MemorySegmentStore>,
    ) -> PipelineController {
        let mut config = AppConfig::new();
        config.transcription.segment_duration_secs = 0.1;
        config.transcription.batch_size = 8;

        PipelineController::with_config(
            config,
            store,
            device,
            Arc::new(FixedProvider {
                source: ProviderSource::Remote,
                text: "text".to_string(),
            }),
            Arc::new(FixedProvider {
                source: ProviderSource::Local,
                text: "local".to_string(),
            }),
            Arc::new(WatchReachabilityMonitor::new(true)),
            dir.join("segments"),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_recording_drives_segments_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("recording.wav");
        write_recording(&recording, 0.3);

        let device = FakeDevice::with_recording(recording);
        let store = Arc::new(MemorySegmentStore::new());
        let controller = test_controller(dir.path(), device, store.clone());

        let session = controller.stop_recording("morning notes").await.unwrap();
        assert_eq!(session.title, "morning notes");
        assert!(store.fetch_session(session.id).await.unwrap().is_some());

        for _ in 0..3000 {
            let segments = store.fetch_segments(session.id).await.unwrap();
            if segments.len() == 3
                && segments.iter().all(|s| s.status == SegmentStatus::Completed)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        let text = controller.full_transcription(session.id).await.unwrap();
        assert_eq!(text, "text text text");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_session_reclaims_records_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("recording.wav");
        write_recording(&recording, 0.3);

        let device = FakeDevice::with_recording(recording.clone());
        let store = Arc::new(MemorySegmentStore::new());
        let controller = test_controller(dir.path(), device, store.clone());

        let session = controller.stop_recording("to delete").await.unwrap();
        for _ in 0..3000 {
            if store.fetch_segments(session.id).await.unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        controller.delete_session(session.id).await.unwrap();

        assert!(store.fetch_session(session.id).await.unwrap().is_none());
        assert!(store.fetch_segments(session.id).await.unwrap().is_empty());
        assert!(!recording.exists());
        // Deleting again reports the missing session.
        assert!(matches!(
            controller.delete_session(session.id).await,
            Err(DomainError::Constraint(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_session_routes_through_device() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("recording.wav");
        write_recording(&recording, 0.1);

        let device = FakeDevice::with_recording(recording.clone());
        let store = Arc::new(MemorySegmentStore::new());
        let controller = test_controller(dir.path(), device.clone(), store);

        let session = controller.stop_recording("playback").await.unwrap();
        controller.play_session(session.id).await.unwrap();

        assert_eq!(device.played.lock().as_slice(), &[recording]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_unknown_session_is_constraint_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = FakeDevice::with_recording(dir.path().join("never.wav"));
        let store = Arc::new(MemorySegmentStore::new());
        let controller = test_controller(dir.path(), device, store);

        assert!(matches!(
            controller.play_session(Uuid::new_v4()).await,
            Err(DomainError::Constraint(_))
        ));
    }
}
