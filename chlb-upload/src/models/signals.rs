//! Server-pushed processing signals
//!
//! The backend pushes ten named events while it processes an upload. Each wire
//! event name maps to exactly one decoder in [`SIGNAL_TABLE`]; the decoded
//! [`ProcessingSignal`] is then applied by the session reducer. Handlers are
//! never registered per connection, so a reconnect cannot duplicate them.

use chlb_common::events::{Achievement, AchievementError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Signal decoding errors
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Malformed payload for '{event}': {reason}")]
    MalformedPayload { event: String, reason: String },
}

/// Decoded processing signal
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingSignal {
    /// Backend accepted the file and started processing
    ProcessingStarted,
    /// Song metadata lookup in progress
    FetchingSongs { message: String },
    /// Per-song progress
    ProgressUpdate {
        progress: f64,
        processed: u64,
        total: u64,
    },
    /// Backend is writing results (leaderboards, profile)
    UploadingPhase { message: String },
    /// Free-form progress message; does not move the progress bar
    ProgressMessage { message: String },
    /// Achievement evaluation started
    AchievementsProcessing { message: String },
    AchievementUnlocked { achievement: Achievement },
    /// Achievements the backend failed to grant (full replace)
    AchievementErrors { errors: Vec<AchievementError> },
    ProcessingComplete {
        message: String,
        /// e.g. `completed` or `completed_with_errors`
        status: Option<String>,
        errors: Option<Vec<AchievementError>>,
    },
    ProcessingError { message: String },
}

impl ProcessingSignal {
    /// Short signal name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingSignal::ProcessingStarted => "processing-start",
            ProcessingSignal::FetchingSongs { .. } => "fetching-songs",
            ProcessingSignal::ProgressUpdate { .. } => "progress-update",
            ProcessingSignal::UploadingPhase { .. } => "uploading-phase",
            ProcessingSignal::ProgressMessage { .. } => "progress-message",
            ProcessingSignal::AchievementsProcessing { .. } => "achievements-processing",
            ProcessingSignal::AchievementUnlocked { .. } => "achievement-unlocked",
            ProcessingSignal::AchievementErrors { .. } => "achievement-errors",
            ProcessingSignal::ProcessingComplete { .. } => "processing-complete",
            ProcessingSignal::ProcessingError { .. } => "processing-error",
        }
    }

    /// Achievement notifications are accepted in every phase
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            ProcessingSignal::AchievementUnlocked { .. } | ProcessingSignal::AchievementErrors { .. }
        )
    }
}

#[derive(Deserialize)]
struct MessagePayload {
    message: String,
}

#[derive(Deserialize)]
struct ProgressPayload {
    progress: f64,
    #[serde(default)]
    processed: u64,
    #[serde(default)]
    total: u64,
}

#[derive(Deserialize)]
struct AchievementPayload {
    achievement: Achievement,
}

#[derive(Deserialize)]
struct AchievementErrorsPayload {
    #[serde(default)]
    errors: Vec<AchievementError>,
}

#[derive(Deserialize)]
struct CompletePayload {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Option<Vec<AchievementError>>,
}

pub type Decoder = fn(Value) -> Result<ProcessingSignal, serde_json::Error>;

fn decode_start(_payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    Ok(ProcessingSignal::ProcessingStarted)
}

fn decode_fetching(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: MessagePayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::FetchingSongs { message: p.message })
}

fn decode_progress(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: ProgressPayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::ProgressUpdate {
        progress: p.progress,
        processed: p.processed,
        total: p.total,
    })
}

fn decode_uploading(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: MessagePayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::UploadingPhase { message: p.message })
}

fn decode_progress_message(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: MessagePayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::ProgressMessage { message: p.message })
}

fn decode_achievements_processing(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: MessagePayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::AchievementsProcessing { message: p.message })
}

fn decode_achievement(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: AchievementPayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::AchievementUnlocked {
        achievement: p.achievement,
    })
}

fn decode_achievement_errors(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: AchievementErrorsPayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::AchievementErrors { errors: p.errors })
}

fn decode_complete(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: CompletePayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::ProcessingComplete {
        message: p.message,
        status: p.status.filter(|s| !s.is_empty()),
        errors: p.errors,
    })
}

fn decode_error(payload: Value) -> Result<ProcessingSignal, serde_json::Error> {
    let p: MessagePayload = serde_json::from_value(payload)?;
    Ok(ProcessingSignal::ProcessingError { message: p.message })
}

/// Wire event name → decoder
pub static SIGNAL_TABLE: &[(&str, Decoder)] = &[
    ("score_processing_start", decode_start as Decoder),
    ("score_processing_fetching_songs", decode_fetching as Decoder),
    ("score_processing_progress", decode_progress as Decoder),
    ("score_processing_uploading", decode_uploading as Decoder),
    ("score_processing_updating_progress", decode_progress_message as Decoder),
    ("score_processing_processing_achievements", decode_achievements_processing as Decoder),
    ("new_achievement", decode_achievement as Decoder),
    ("score_processing_achievement_errors", decode_achievement_errors as Decoder),
    ("score_processing_complete", decode_complete as Decoder),
    ("score_processing_error", decode_error as Decoder),
];

/// Decode a wire event
///
/// Returns `Ok(None)` for events this tracker does not consume.
pub fn decode_signal(event: &str, payload: Value) -> Result<Option<ProcessingSignal>, SignalError> {
    let Some((_, decoder)) = SIGNAL_TABLE.iter().find(|(name, _)| *name == event) else {
        return Ok(None);
    };

    decoder(payload)
        .map(Some)
        .map_err(|e| SignalError::MalformedPayload {
            event: event.to_string(),
            reason: e.to_string(),
        })
}
