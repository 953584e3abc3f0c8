//! Upload session state machine
//!
//! IDLE → UPLOADING → WAITING_FOR_PROCESSING → IN_PROGRESS → COMPLETED
//!
//! FAILED is reachable from the upload phase (local failure) and from
//! processing (server-reported failure). COMPLETED and FAILED are terminal
//! until [`UploadSession::reset`].
//!
//! The phase is a single enum, so contradictory flag combinations (uploading
//! and processing at once) cannot be represented. The flag view consumers
//! expect is derived in [`UploadSession::snapshot`].

use chlb_common::events::{Achievement, AchievementError, SessionSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::signals::ProcessingSignal;

/// Progress value reported once achievement evaluation starts
const ACHIEVEMENTS_PROGRESS: f64 = 95.0;

/// Default completion status when the backend omits one
const STATUS_COMPLETED: &str = "completed";

/// Upload session phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum UploadPhase {
    /// No job
    Idle,
    /// Raw file transfer request outstanding
    Uploading,
    /// Upload accepted; processing events expected
    WaitingForProcessing,
    /// Backend processing, push-driven
    Processing {
        /// 0.0 - 100.0
        progress: f64,
    },
    /// Processing finished
    Completed {
        /// `completed` or the backend-supplied status (e.g. `completed_with_errors`)
        status: String,
    },
    /// Upload or processing failed
    Failed,
}

impl UploadPhase {
    /// Status string exposed to consumers
    pub fn status(&self) -> &str {
        match self {
            UploadPhase::Idle => "idle",
            UploadPhase::Uploading => "uploading",
            UploadPhase::WaitingForProcessing => "waiting_for_processing",
            UploadPhase::Processing { .. } => "in_progress",
            UploadPhase::Completed { status } => status,
            UploadPhase::Failed => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadPhase::Completed { .. } | UploadPhase::Failed)
    }

    /// Progress shown by the progress bar
    pub fn progress(&self) -> f64 {
        match self {
            UploadPhase::Processing { progress } => *progress,
            UploadPhase::Completed { .. } => 100.0,
            _ => 0.0,
        }
    }
}

/// Result of the raw file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    Error,
}

/// Phase transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub old_status: String,
    pub new_status: String,
    pub transitioned_at: DateTime<Utc>,
}

/// Upload session (in-memory state)
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Current phase
    pub phase: UploadPhase,

    /// Human-readable status, replaced wholesale on each transition
    pub message: String,

    /// Identity used to join the notification room
    pub user_id: Option<String>,

    /// Unlocked achievements in arrival order, unique by id
    pub new_achievements: Vec<Achievement>,

    /// Achievements the backend failed to grant
    pub achievement_errors: Vec<AchievementError>,

    /// Time of the last mutation
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Create an idle session
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            phase: UploadPhase::Idle,
            message: String::new(),
            user_id,
            new_achievements: Vec::new(),
            achievement_errors: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Transition to new phase
    pub fn transition_to(&mut self, new_phase: UploadPhase) -> StateTransition {
        let transition = StateTransition {
            old_status: self.phase.status().to_string(),
            new_status: new_phase.status().to_string(),
            transitioned_at: Utc::now(),
        };
        if transition.old_status != transition.new_status {
            debug!(
                from = %transition.old_status,
                to = %transition.new_status,
                "Upload session transition"
            );
        }
        self.phase = new_phase;
        self.updated_at = transition.transitioned_at;
        transition
    }

    /// Check if session is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Mark intent to upload; starts a fresh attempt from any phase
    pub fn start_upload(&mut self) {
        self.transition_to(UploadPhase::Uploading);
        self.message = "Starting upload...".to_string();
        self.new_achievements.clear();
        self.achievement_errors.clear();
    }

    /// Record the result of the raw file transfer
    ///
    /// Returns whether the session changed.
    pub fn finish_upload(&mut self, message: &str, outcome: UploadOutcome) -> bool {
        if self.is_terminal() {
            debug!("finish_upload ignored: session is terminal");
            return false;
        }

        match (outcome, &self.phase) {
            (UploadOutcome::Error, _) => {
                self.transition_to(UploadPhase::Failed);
                self.message = message.to_string();
                true
            }
            (UploadOutcome::Success, UploadPhase::Idle | UploadPhase::Uploading) => {
                self.transition_to(UploadPhase::WaitingForProcessing);
                self.message = message.to_string();
                true
            }
            (UploadOutcome::Success, _) => {
                // Processing events already overtook the upload response
                debug!(
                    status = self.phase.status(),
                    "finish_upload ignored: processing already underway"
                );
                false
            }
        }
    }

    /// Return to idle defaults; achievement lists are left untouched
    pub fn reset(&mut self) {
        self.transition_to(UploadPhase::Idle);
        self.message.clear();
    }

    /// Resume a job reported by the status probe
    ///
    /// Only applies while idle so a probe never overrides a user action.
    pub fn resume_processing(&mut self, progress: Option<f64>) -> bool {
        if self.phase != UploadPhase::Idle {
            return false;
        }
        let progress = progress.and_then(sanitize_progress).unwrap_or(0.0);
        self.transition_to(UploadPhase::Processing { progress });
        self.message = "Resuming processing...".to_string();
        true
    }

    pub fn clear_achievement(&mut self, id: &str) -> bool {
        let before = self.new_achievements.len();
        self.new_achievements.retain(|a| a.id != id);
        let changed = self.new_achievements.len() != before;
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    pub fn clear_all_notifications(&mut self) -> bool {
        let changed = !self.new_achievements.is_empty() || !self.achievement_errors.is_empty();
        self.new_achievements.clear();
        self.achievement_errors.clear();
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Apply a server-pushed signal
    ///
    /// Returns whether the session changed. Achievement notifications are
    /// accepted in every phase; all other signals are ignored once terminal.
    pub fn apply_signal(&mut self, signal: ProcessingSignal) -> bool {
        if self.is_terminal() && !signal.is_notification() {
            debug!(signal = signal.name(), "Signal ignored: session is terminal");
            return false;
        }

        match signal {
            ProcessingSignal::AchievementUnlocked { achievement } => {
                self.push_achievement(achievement)
            }
            ProcessingSignal::AchievementErrors { errors } => {
                self.achievement_errors = errors;
                self.updated_at = Utc::now();
                true
            }
            ProcessingSignal::ProcessingStarted => {
                self.transition_to(UploadPhase::Processing { progress: 0.0 });
                self.message = "Processing started...".to_string();
                self.new_achievements.clear();
                self.achievement_errors.clear();
                true
            }
            ProcessingSignal::FetchingSongs { message }
            | ProcessingSignal::UploadingPhase { message }
            | ProcessingSignal::ProgressMessage { message } => {
                self.ensure_processing();
                self.message = message;
                true
            }
            ProcessingSignal::ProgressUpdate {
                progress,
                processed,
                total,
            } => {
                self.ensure_processing();
                if let Some(progress) = sanitize_progress(progress) {
                    self.set_progress(progress);
                }
                self.message = format!("Processing song {} of {}", processed, total);
                true
            }
            ProcessingSignal::AchievementsProcessing { message } => {
                self.ensure_processing();
                self.set_progress(ACHIEVEMENTS_PROGRESS);
                self.message = message;
                true
            }
            ProcessingSignal::ProcessingComplete {
                message,
                status,
                errors,
            } => {
                self.ensure_processing();
                let status = status.unwrap_or_else(|| STATUS_COMPLETED.to_string());
                self.transition_to(UploadPhase::Completed { status });
                self.message = message;
                if let Some(errors) = errors {
                    self.achievement_errors = errors;
                }
                info!(status = self.phase.status(), "Score processing completed");
                true
            }
            ProcessingSignal::ProcessingError { message } => {
                self.transition_to(UploadPhase::Failed);
                self.message = format!("Error: {}", message);
                info!(message = %self.message, "Score processing failed");
                true
            }
        }
    }

    /// Read-only view for consumers
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.phase.status().to_string(),
            is_uploading: matches!(self.phase, UploadPhase::Uploading),
            is_processing: matches!(self.phase, UploadPhase::Processing { .. }),
            progress: self.phase.progress(),
            message: self.message.clone(),
            completed: self.is_terminal(),
            user_id: self.user_id.clone(),
            new_achievements: self.new_achievements.clone(),
            achievement_errors: self.achievement_errors.clone(),
            updated_at: self.updated_at,
        }
    }

    /// First arrival wins; later duplicates are dropped unchanged
    fn push_achievement(&mut self, achievement: Achievement) -> bool {
        if self.new_achievements.iter().any(|a| a.id == achievement.id) {
            debug!(id = %achievement.id, "Duplicate achievement dropped");
            return false;
        }
        info!(id = %achievement.id, name = %achievement.name, "Achievement unlocked");
        self.new_achievements.push(achievement);
        self.updated_at = Utc::now();
        true
    }

    /// Processing signals imply processing is underway, so a session that
    /// missed the start signal joins the job instead of skipping the phase.
    fn ensure_processing(&mut self) {
        if !matches!(self.phase, UploadPhase::Processing { .. }) {
            debug!(
                status = self.phase.status(),
                "Joining processing already underway"
            );
            self.transition_to(UploadPhase::Processing { progress: 0.0 });
        }
    }

    fn set_progress(&mut self, value: f64) {
        if let UploadPhase::Processing { progress } = &mut self.phase {
            *progress = value;
            self.updated_at = Utc::now();
        }
    }
}

/// Clamp untrusted server progress into 0..=100; non-finite values are dropped
pub fn sanitize_progress(progress: f64) -> Option<f64> {
    progress.is_finite().then(|| progress.clamp(0.0, 100.0))
}
