//! Upload session type definitions
//!
//! Shapes shared between the tracker and its consumers. Achievement payloads
//! are produced by the backend and passed through verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Achievement unlocked during score processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable achievement identifier (e.g. `score_rank_3`)
    pub id: String,
    pub name: String,
    pub description: String,
    /// Tier within its ladder; 0 for unranked achievements
    #[serde(default)]
    pub rank: i64,
    pub category: String,
    #[serde(default)]
    pub achieved: bool,
    /// When the backend granted it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Song the achievement is tied to, for song-specific achievements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_md5: Option<String>,
}

/// Achievement the backend failed to grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementError {
    pub id: String,
    pub name: String,
    pub error: String,
}

/// Read-only view of the upload session handed to consumers
///
/// Field names follow the browser-side camelCase shape so snapshots can be
/// forwarded to web consumers unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// `idle`, `uploading`, `waiting_for_processing`, `in_progress`,
    /// a completion status such as `completed`, or `error`
    pub status: String,
    /// True only while the raw file transfer is outstanding
    pub is_uploading: bool,
    /// True while the backend is processing the upload
    pub is_processing: bool,
    /// 0.0 - 100.0
    pub progress: f64,
    pub message: String,
    /// Terminal marker (success or failure)
    pub completed: bool,
    pub user_id: Option<String>,
    pub new_achievements: Vec<Achievement>,
    pub achievement_errors: Vec<AchievementError>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Whether the last terminal transition was a failure
    pub fn is_failed(&self) -> bool {
        self.completed && self.status == "error"
    }
}
