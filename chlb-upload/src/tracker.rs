//! Upload progress tracker
//!
//! One tracker exists per running client. It is constructed explicitly by the
//! entry point and handed to every consumer by clone (all clones share the
//! same session). Consumers read snapshots or subscribe to the event bus;
//! every mutation publishes a full snapshot.
//!
//! # Liveness
//!
//! Network results that resolve late (status probe, upload response) carry
//! the generation captured when they were issued. The generation advances on
//! `start_upload`, `reset_upload_state` and `shutdown`, and stale results are
//! dropped instead of mutating a newer (or torn-down) session.

use chlb_common::config::ClientConfig;
use chlb_common::events::{ChannelStatus, EventBus, SessionSnapshot, TrackerEvent};
use chlb_common::LocalIdentity;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientResult;
use crate::models::{ProcessingSignal, UploadOutcome, UploadSession};
use crate::realtime::RealtimeChannel;
use crate::services::status_probe::{ProcessingStatus, StatusProbeClient};

/// Shared upload/processing session with imperative actions
#[derive(Clone)]
pub struct UploadProgressTracker {
    session: Arc<RwLock<UploadSession>>,
    event_bus: EventBus,
    generation: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl UploadProgressTracker {
    pub fn new(user_id: Option<String>, event_bus: EventBus) -> Self {
        Self {
            session: Arc::new(RwLock::new(UploadSession::new(user_id))),
            event_bus,
            generation: Arc::new(AtomicU64::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create the tracker and start its background tasks
    ///
    /// 1. The status probe runs once when an identity and token are known.
    /// 2. The real-time channel starts regardless of the probe's outcome.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(
        config: &ClientConfig,
        identity: &LocalIdentity,
        event_bus: EventBus,
    ) -> ClientResult<TrackerHandle> {
        let tracker = Self::new(identity.user_id().map(str::to_string), event_bus);

        let probe = match (identity.user_id(), identity.auth_token()) {
            (Some(_), Some(token)) => {
                let client = StatusProbeClient::new(&config.api_url, config.probe_timeout)?;
                let token = token.to_string();
                let probe_tracker = tracker.clone();
                Some(tokio::spawn(async move {
                    resume_from_probe(&probe_tracker, &client, &token).await;
                }))
            }
            (Some(_), None) => {
                debug!("No auth token; skipping processing status probe");
                None
            }
            (None, _) => {
                debug!("Anonymous session; skipping processing status probe");
                None
            }
        };

        let channel = RealtimeChannel::new(
            &config.api_url,
            identity.user_id().map(str::to_string),
            config.realtime.clone(),
            tracker.clone(),
        )?;
        let channel = tokio::spawn(channel.run());

        info!(
            signed_in = identity.is_signed_in(),
            "Upload progress tracker started"
        );

        Ok(TrackerHandle {
            tracker,
            probe,
            channel,
        })
    }

    /// Current session state
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.read().await.snapshot()
    }

    /// Subscribe to session and channel events
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Generation to capture before issuing a network request
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether the tracker has been torn down
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled on shutdown; background tasks select on it
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Mark intent to upload
    ///
    /// Returns the generation of the new attempt; pass it to
    /// [`finish_upload_if_current`](Self::finish_upload_if_current).
    pub async fn start_upload(&self) -> u64 {
        let mut generation = self.generation();
        self.mutate(None, |session| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            session.start_upload();
            true
        })
        .await;
        generation
    }

    /// Record the upload result
    pub async fn finish_upload(&self, message: &str, outcome: UploadOutcome) {
        self.mutate(None, |session| session.finish_upload(message, outcome))
            .await;
    }

    /// Record the upload result unless the attempt has been superseded
    pub async fn finish_upload_if_current(
        &self,
        generation: u64,
        message: &str,
        outcome: UploadOutcome,
    ) -> bool {
        self.mutate(Some(generation), |session| {
            session.finish_upload(message, outcome)
        })
        .await
    }

    /// Return the session to idle; achievement lists are kept
    pub async fn reset_upload_state(&self) {
        self.mutate(None, |session| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            session.reset();
            true
        })
        .await;
    }

    pub async fn clear_achievement(&self, id: &str) {
        self.mutate(None, |session| session.clear_achievement(id))
            .await;
    }

    pub async fn clear_all_notifications(&self) {
        self.mutate(None, |session| session.clear_all_notifications())
            .await;
    }

    /// Apply a server-pushed signal
    pub async fn apply_signal(&self, signal: ProcessingSignal) -> bool {
        debug!(signal = signal.name(), "Applying processing signal");
        self.mutate(None, |session| session.apply_signal(signal))
            .await
    }

    /// Resume a job reported by the status probe issued at `generation`
    pub async fn resume_if_current(&self, generation: u64, status: &ProcessingStatus) -> bool {
        if !status.is_active() {
            return false;
        }
        self.mutate(Some(generation), |session| {
            session.resume_processing(status.progress)
        })
        .await
    }

    /// Publish a channel lifecycle change
    pub fn publish_channel_status(&self, status: ChannelStatus, attempt: u32) {
        self.event_bus.emit_lossy(TrackerEvent::ChannelStatusChanged {
            status,
            attempt,
            timestamp: Utc::now(),
        });
    }

    /// Tear down: stop the channel and drop every late result
    pub fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.shutdown.cancel();
        info!("Upload progress tracker shut down");
    }

    /// Run one mutation to completion under the write lock and publish the
    /// resulting snapshot when anything changed
    async fn mutate<F>(&self, generation: Option<u64>, f: F) -> bool
    where
        F: FnOnce(&mut UploadSession) -> bool,
    {
        let mut session = self.session.write().await;

        if self.shutdown.is_cancelled() {
            debug!("Mutation ignored: tracker is shut down");
            return false;
        }
        if let Some(expected) = generation {
            if expected != self.generation() {
                debug!(
                    expected,
                    current = self.generation(),
                    "Stale result dropped"
                );
                return false;
            }
        }

        let changed = f(&mut session);
        if changed {
            self.event_bus.emit_lossy(TrackerEvent::SessionChanged {
                snapshot: session.snapshot(),
            });
        }
        changed
    }
}

/// Probe the backend once and resume an active job
///
/// Failures are logged and otherwise ignored: no information means no job.
pub async fn resume_from_probe(
    tracker: &UploadProgressTracker,
    client: &StatusProbeClient,
    auth_token: &str,
) -> bool {
    let generation = tracker.generation();

    match client.fetch_status(auth_token).await {
        Ok(Some(status)) if status.is_active() => {
            let resumed = tracker.resume_if_current(generation, &status).await;
            if resumed {
                info!(
                    status = %status.status,
                    progress = status.progress.unwrap_or(0.0),
                    "Resumed processing job in progress"
                );
            }
            resumed
        }
        Ok(Some(status)) => {
            debug!(status = %status.status, "No active processing job");
            false
        }
        Ok(None) => {
            debug!("No active processing job");
            false
        }
        Err(e) => {
            warn!("Processing status probe failed: {}", e);
            false
        }
    }
}

/// Running tracker plus its background tasks
pub struct TrackerHandle {
    tracker: UploadProgressTracker,
    probe: Option<JoinHandle<()>>,
    channel: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn tracker(&self) -> &UploadProgressTracker {
        &self.tracker
    }

    /// Shut the tracker down and wait for its tasks to finish
    pub async fn shutdown(self) {
        self.tracker.shutdown();
        if let Some(probe) = self.probe {
            probe.abort();
            let _ = probe.await;
        }
        if let Err(e) = self.channel.await {
            if !e.is_cancelled() {
                warn!("Real-time channel task ended abnormally: {}", e);
            }
        }
    }
}
