use std::collections::{HashMap, HashSet, VecDeque};
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::signal;
use crate::domain::{
    full_transcription, AudioBuffer, DomainError, ProviderSource, Segment, SegmentStatus,
    TranscriptionConfig,
};
use crate::ports::{ReachabilityMonitor, SegmentStore, TranscriptionProvider};

/// Events emitted by the orchestrator for observers (UI, metrics, tests).
///
/// Observation never gates progress: events are broadcast best-effort and
/// dropped when nobody listens.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A segment moved through its state machine.
    SegmentStatusChanged {
        segment_id: Uuid,
        status: SegmentStatus,
    },
    /// A segment finished; `source` is None when it was skipped as silent.
    SegmentCompleted {
        segment_id: Uuid,
        source: Option<ProviderSource>,
    },
    /// The consecutive-failure breaker tripped; all subsequent dispatches
    /// use the local provider.
    FallbackEngaged { consecutive_failures: u32 },
    /// Connectivity returned and the offline queue was re-dispatched.
    QueueDrained { requeued: usize },
    /// A record write failed; surfaced distinctly from transcription
    /// failures and never counted against a provider.
    PersistenceFailure { segment_id: Uuid, message: String },
}

/// Point-in-time view of the orchestrator's working set.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    /// Segments in creation order.
    pub segments: Vec<Segment>,
    /// Whether any dispatch is in flight or waiting for a slot.
    pub is_processing: bool,
}

enum Command {
    Enqueue(Segment),
    Resume(Vec<Segment>),
    RetryExpired { segment_id: Uuid },
    DispatchFinished { segment_id: Uuid, outcome: DispatchOutcome },
    ConnectivityChanged(bool),
    RetryFailed,
    ClearCompleted,
    FullTranscription {
        session_id: Uuid,
        reply: oneshot::Sender<Result<String, DomainError>>,
    },
    Snapshot { reply: oneshot::Sender<PipelineSnapshot> },
}

enum DispatchOutcome {
    /// A provider returned text.
    Transcribed { text: String, source: ProviderSource },
    /// Voice-activity gating found nothing worth transcribing.
    SkippedSilent,
    /// The dispatch failed; `provider_attempted` is false when the artifact
    /// never reached a provider (decode/preprocessing failure).
    Failed {
        error: DomainError,
        provider_attempted: bool,
    },
}

/// Handle to the transcription orchestrator.
///
/// All queue, counter and mode state lives in a single actor task; this
/// handle only passes messages, so it is cheap to clone and safe to share.
#[derive(Clone)]
pub struct Orchestrator {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Orchestrator {
    /// Spawn the orchestrator actor and its reachability watcher.
    pub fn new(
        config: TranscriptionConfig,
        store: Arc<dyn SegmentStore>,
        remote: Arc<dyn TranscriptionProvider>,
        local: Arc<dyn TranscriptionProvider>,
        reachability: Arc<dyn ReachabilityMonitor>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(128);
        let (events, _) = broadcast::channel(256);

        // Forward connectivity transitions into the command stream so all
        // state mutation stays on the actor.
        let mut watch_rx = reachability.subscribe();
        let watch_tx = tx.clone();
        tokio::spawn(async move {
            while watch_rx.changed().await.is_ok() {
                let connected = *watch_rx.borrow();
                if watch_tx
                    .send(Command::ConnectivityChanged(connected))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let engine = Engine {
            config,
            store,
            remote,
            local,
            tx: tx.clone(),
            events: events.clone(),
            segments: HashMap::new(),
            insertion_order: Vec::new(),
            pending_queue: VecDeque::new(),
            backlog: VecDeque::new(),
            last_resort: HashSet::new(),
            in_flight: 0,
            consecutive_failures: 0,
            fallback_mode: false,
            connected: reachability.is_connected(),
        };
        tokio::spawn(engine.run(rx));

        Self { tx, events }
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Hand a freshly segmented slice to the pipeline.
    pub async fn enqueue(&self, segment: Segment) -> Result<(), DomainError> {
        self.send(Command::Enqueue(segment)).await
    }

    /// Re-admit persisted segments after a restart; pending and queued ones
    /// are re-dispatched, terminal ones only join the working set.
    pub async fn resume(&self, segments: Vec<Segment>) -> Result<(), DomainError> {
        self.send(Command::Resume(segments)).await
    }

    /// Report a connectivity transition directly (hosts without a
    /// reachability adapter).
    pub async fn connectivity_changed(&self, connected: bool) -> Result<(), DomainError> {
        self.send(Command::ConnectivityChanged(connected)).await
    }

    /// Re-enqueue every failed segment.
    pub async fn retry_failed(&self) -> Result<(), DomainError> {
        self.send(Command::RetryFailed).await
    }

    /// Drop completed segments from the in-memory working set. Persisted
    /// records are untouched.
    pub async fn clear_completed(&self) -> Result<(), DomainError> {
        self.send(Command::ClearCompleted).await
    }

    /// Aggregate transcription for a session: completed segments' text in
    /// start-time order, joined with single spaces.
    pub async fn full_transcription(&self, session_id: Uuid) -> Result<String, DomainError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::FullTranscription { session_id, reply })
            .await?;
        rx.await
            .map_err(|_| DomainError::Io("orchestrator dropped the reply".to_string()))?
    }

    /// Current working set and processing flag.
    pub async fn snapshot(&self) -> Result<PipelineSnapshot, DomainError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await
            .map_err(|_| DomainError::Io("orchestrator dropped the reply".to_string()))
    }

    async fn send(&self, command: Command) -> Result<(), DomainError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| DomainError::Io("orchestrator is not running".to_string()))
    }
}

/// Actor owning every piece of mutable pipeline state.
struct Engine {
    config: TranscriptionConfig,
    store: Arc<dyn SegmentStore>,
    remote: Arc<dyn TranscriptionProvider>,
    local: Arc<dyn TranscriptionProvider>,
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<PipelineEvent>,

    segments: HashMap<Uuid, Segment>,
    insertion_order: Vec<Uuid>,
    /// Segments held back while offline (status Queued).
    pending_queue: VecDeque<Uuid>,
    /// Ready segments waiting for an in-flight slot under the batch cap.
    backlog: VecDeque<Uuid>,
    /// Segments currently on their one last-resort local pass.
    last_resort: HashSet<Uuid>,
    in_flight: usize,
    consecutive_failures: u32,
    fallback_mode: bool,
    connected: bool,
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(
            connected = self.connected,
            batch_size = self.config.batch_size,
            "Orchestrator started"
        );

        while let Some(command) = rx.recv().await {
            match command {
                Command::Enqueue(segment) => self.handle_enqueue(segment).await,
                Command::Resume(segments) => self.handle_resume(segments).await,
                Command::RetryExpired { segment_id } => self.handle_retry_expired(segment_id).await,
                Command::DispatchFinished {
                    segment_id,
                    outcome,
                } => self.handle_dispatch_finished(segment_id, outcome).await,
                Command::ConnectivityChanged(connected) => {
                    self.handle_connectivity(connected).await
                }
                Command::RetryFailed => self.handle_retry_failed().await,
                Command::ClearCompleted => self.handle_clear_completed(),
                Command::FullTranscription { session_id, reply } => {
                    let result = match self.store.fetch_segments(session_id).await {
                        Ok(segments) => Ok(full_transcription(&segments)),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }
    }

    async fn handle_enqueue(&mut self, segment: Segment) {
        let id = segment.id;
        if self.segments.contains_key(&id) {
            warn!(segment_id = %id, "Segment already enqueued, ignoring");
            return;
        }
        debug!(segment_id = %id, start_time = segment.start_time, "Segment enqueued");
        self.segments.insert(id, segment);
        self.insertion_order.push(id);
        self.dispatch_or_queue(id).await;
    }

    async fn handle_resume(&mut self, segments: Vec<Segment>) {
        let mut requeued = 0usize;
        for segment in segments {
            let id = segment.id;
            if self.segments.contains_key(&id) {
                continue;
            }
            let redispatch = matches!(
                segment.status,
                SegmentStatus::Pending | SegmentStatus::Queued
            );
            self.segments.insert(id, segment);
            self.insertion_order.push(id);
            if redispatch {
                requeued += 1;
                self.dispatch_or_queue(id).await;
            }
        }
        info!(requeued = requeued, "Resumed persisted segments");
    }

    async fn handle_retry_expired(&mut self, segment_id: Uuid) {
        // A fired timer is only honored when the segment is still waiting on
        // a retry; anything else means another path (manual retry, clear)
        // already superseded it.
        let still_pending = self
            .segments
            .get(&segment_id)
            .is_some_and(|s| s.status == SegmentStatus::Pending);
        if still_pending {
            self.dispatch_or_queue(segment_id).await;
        } else {
            debug!(segment_id = %segment_id, "Discarding superseded retry timer");
        }
    }

    async fn handle_connectivity(&mut self, connected: bool) {
        let was_connected = mem::replace(&mut self.connected, connected);
        if connected && !was_connected {
            // Drain a snapshot of the queue; segments enqueued during the
            // drain wait for the next transition or their retry.
            let drained = mem::take(&mut self.pending_queue);
            let requeued = drained.len();
            info!(requeued = requeued, "Connectivity restored, draining queue");
            for id in drained {
                self.dispatch_or_queue(id).await;
            }
            self.emit(PipelineEvent::QueueDrained { requeued });
        }
    }

    async fn handle_retry_failed(&mut self) {
        let failed: Vec<Uuid> = self
            .insertion_order
            .iter()
            .copied()
            .filter(|id| {
                self.segments
                    .get(id)
                    .is_some_and(|s| s.status == SegmentStatus::Failed)
            })
            .collect();
        info!(count = failed.len(), "Re-enqueueing failed segments");
        for id in failed {
            self.dispatch_or_queue(id).await;
        }
    }

    fn handle_clear_completed(&mut self) {
        let before = self.segments.len();
        self.segments
            .retain(|_, s| s.status != SegmentStatus::Completed);
        self.insertion_order
            .retain(|id| self.segments.contains_key(id));
        debug!(
            removed = before - self.segments.len(),
            "Cleared completed segments from working set"
        );
    }

    async fn handle_dispatch_finished(&mut self, segment_id: Uuid, outcome: DispatchOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome {
            DispatchOutcome::Transcribed { text, source } => {
                self.complete_segment(segment_id, text, Some(source)).await;
            }
            DispatchOutcome::SkippedSilent => {
                debug!(segment_id = %segment_id, "No voice activity, completing without dispatch");
                self.complete_segment(segment_id, String::new(), None).await;
            }
            DispatchOutcome::Failed {
                error,
                provider_attempted,
            } => {
                self.fail_dispatch(segment_id, error, provider_attempted)
                    .await;
            }
        }

        // Refill freed slots from the backlog in FIFO order.
        while self.in_flight < self.config.batch_size {
            let Some(next) = self.backlog.pop_front() else {
                break;
            };
            self.dispatch_or_queue(next).await;
        }
    }

    /// Route a segment toward a provider under the current mode, or park it
    /// in the offline queue / slot backlog.
    async fn dispatch_or_queue(&mut self, id: Uuid) {
        let Some(segment) = self.segments.get(&id) else {
            return;
        };
        // A segment is never in flight twice; Processing and Completed are
        // not dispatchable.
        if !segment.status.can_dispatch() {
            return;
        }

        if !self.connected && !self.fallback_mode {
            self.set_status(id, SegmentStatus::Queued);
            self.pending_queue.push_back(id);
            return;
        }

        if self.in_flight >= self.config.batch_size {
            self.backlog.push_back(id);
            return;
        }

        self.start_dispatch(id, self.fallback_mode);
    }

    fn start_dispatch(&mut self, id: Uuid, use_local: bool) {
        let Some(segment) = self.segments.get(&id) else {
            return;
        };
        if !segment.status.can_dispatch() {
            return;
        }
        let audio_path = segment.audio_path.clone();
        let provider = if use_local {
            Arc::clone(&self.local)
        } else {
            Arc::clone(&self.remote)
        };

        self.in_flight += 1;
        self.set_status(id, SegmentStatus::Processing);

        let preprocessing = self.config.preprocessing;
        let vad_gating = self.config.vad_gating;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome =
                run_dispatch(id, audio_path, provider, preprocessing, vad_gating).await;
            let _ = tx
                .send(Command::DispatchFinished {
                    segment_id: id,
                    outcome,
                })
                .await;
        });
    }

    async fn complete_segment(
        &mut self,
        id: Uuid,
        text: String,
        source: Option<ProviderSource>,
    ) {
        self.last_resort.remove(&id);
        if source.is_some() {
            // Any provider success closes the breaker window.
            self.consecutive_failures = 0;
        }

        let Some(segment) = self.segments.get_mut(&id) else {
            return;
        };
        segment.transcription = Some(text);
        segment.status = SegmentStatus::Completed;
        self.emit(PipelineEvent::SegmentStatusChanged {
            segment_id: id,
            status: SegmentStatus::Completed,
        });

        // The artifact may only be reclaimed once the record is durable.
        if self.persist(id).await {
            let audio_path = self.segments[&id].audio_path.clone();
            if let Err(e) = tokio::fs::remove_file(&audio_path).await {
                warn!(segment_id = %id, error = %e, "Failed to reclaim segment artifact");
            }
            info!(segment_id = %id, source = ?source, "Segment completed");
            self.emit(PipelineEvent::SegmentCompleted {
                segment_id: id,
                source,
            });
        }
    }

    async fn fail_dispatch(&mut self, id: Uuid, error: DomainError, provider_attempted: bool) {
        warn!(segment_id = %id, error = %error, "Dispatch failed");
        let was_last_resort = self.last_resort.remove(&id);

        if provider_attempted {
            self.consecutive_failures += 1;
            if !self.fallback_mode
                && self.config.local_fallback
                && self.consecutive_failures >= self.config.fallback_threshold
            {
                // One-way breaker: stays local until the process restarts.
                self.fallback_mode = true;
                info!(
                    consecutive_failures = self.consecutive_failures,
                    "Engaging local fallback for all subsequent dispatches"
                );
                self.emit(PipelineEvent::FallbackEngaged {
                    consecutive_failures: self.consecutive_failures,
                });
            }
        }

        let budget_path = provider_attempted && !was_last_resort && error.is_retryable();
        if budget_path {
            let retry_count = {
                let Some(segment) = self.segments.get_mut(&id) else {
                    return;
                };
                segment.retry_count += 1;
                segment.retry_count
            };

            if retry_count < self.config.max_retries {
                self.set_status(id, SegmentStatus::Pending);
                let delay = Duration::from_secs(2u64.saturating_pow(retry_count));
                debug!(
                    segment_id = %id,
                    retry_count = retry_count,
                    delay_secs = delay.as_secs(),
                    "Scheduling retry"
                );
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Command::RetryExpired { segment_id: id }).await;
                });
                return;
            }
        }

        // Terminal for this segment: persist the failure.
        self.set_status(id, SegmentStatus::Failed);
        self.persist(id).await;

        // One last-resort local pass once the budget is exhausted, distinct
        // from the global fallback switch. It runs at most once per
        // exhaustion and its own failure never re-enters the retry loop.
        if budget_path && self.config.local_fallback && self.local.is_available() {
            info!(segment_id = %id, "Attempting last-resort local pass");
            self.last_resort.insert(id);
            self.start_dispatch(id, true);
        }
    }

    fn snapshot(&self) -> PipelineSnapshot {
        let segments = self
            .insertion_order
            .iter()
            .filter_map(|id| self.segments.get(id))
            .cloned()
            .collect();
        PipelineSnapshot {
            segments,
            is_processing: self.in_flight > 0 || !self.backlog.is_empty(),
        }
    }

    fn set_status(&mut self, id: Uuid, status: SegmentStatus) {
        if let Some(segment) = self.segments.get_mut(&id) {
            if segment.status != status {
                segment.status = status;
                self.emit(PipelineEvent::SegmentStatusChanged {
                    segment_id: id,
                    status,
                });
            }
        }
    }

    /// Write the segment's current state through the store. Returns whether
    /// the write succeeded; failures are surfaced but never retried here.
    async fn persist(&mut self, id: Uuid) -> bool {
        let Some(segment) = self.segments.get(&id) else {
            return false;
        };
        match self.store.update_segment(segment).await {
            Ok(()) => true,
            Err(e) => {
                warn!(segment_id = %id, error = %e, "Failed to persist segment record");
                self.emit(PipelineEvent::PersistenceFailure {
                    segment_id: id,
                    message: e.to_string(),
                });
                false
            }
        }
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}

/// One provider dispatch, run off the actor: decode the artifact, gate and
/// condition it, then call the provider. Only the provider call itself may
/// suspend for long; decode and DSP run on the blocking pool.
async fn run_dispatch(
    segment_id: Uuid,
    audio_path: PathBuf,
    provider: Arc<dyn TranscriptionProvider>,
    preprocessing: bool,
    vad_gating: bool,
) -> DispatchOutcome {
    let loaded = tokio::task::spawn_blocking(move || -> Result<Option<AudioBuffer>, DomainError> {
        let audio = AudioBuffer::from_wav_file(&audio_path)?;
        // Gate on the raw signal; normalization would amplify noise floors
        // past the energy threshold.
        if vad_gating && !signal::has_voice(&audio) {
            return Ok(None);
        }
        if preprocessing {
            return signal::preprocess(&audio).map(Some);
        }
        Ok(Some(audio))
    })
    .await;

    let audio = match loaded {
        Ok(Ok(Some(audio))) => audio,
        Ok(Ok(None)) => return DispatchOutcome::SkippedSilent,
        Ok(Err(error)) => {
            return DispatchOutcome::Failed {
                error,
                provider_attempted: false,
            }
        }
        Err(e) => {
            return DispatchOutcome::Failed {
                error: DomainError::Io(format!("conditioning task failed: {}", e)),
                provider_attempted: false,
            }
        }
    };

    match provider.transcribe(segment_id, &audio).await {
        Ok(result) => DispatchOutcome::Transcribed {
            text: result.text,
            source: result.source,
        },
        Err(error) => DispatchOutcome::Failed {
            error,
            provider_attempted: true,
        },
    }
}
