//! Line-oriented progress rendering
//!
//! Turns the stream of session snapshots into terminal lines: one line when
//! the status, rounded progress or message changes, and one line per newly
//! unlocked achievement or achievement error.

use chlb_common::events::{ChannelStatus, SessionSnapshot};
use std::collections::HashSet;

/// Remembers what has been printed so repeated snapshots stay quiet
#[derive(Debug, Default)]
pub struct ProgressView {
    last_line: Option<String>,
    shown_achievements: HashSet<String>,
    shown_errors: HashSet<String>,
}

impl ProgressView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for this snapshot (possibly none)
    pub fn render(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        let line = render_status_line(snapshot);
        if self.last_line.as_deref() != Some(line.as_str()) {
            lines.push(line.clone());
            self.last_line = Some(line);
        }

        for achievement in &snapshot.new_achievements {
            if self.shown_achievements.insert(achievement.id.clone()) {
                lines.push(format!(
                    "Achievement unlocked: {} ({}) - {}",
                    achievement.name, achievement.category, achievement.description
                ));
            }
        }

        for error in &snapshot.achievement_errors {
            if self.shown_errors.insert(error.id.clone()) {
                lines.push(format!("Achievement error: {}: {}", error.name, error.error));
            }
        }

        lines
    }
}

/// `[status]  progress%  message`
pub fn render_status_line(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("[{}] {:>5.1}%", snapshot.status, snapshot.progress);
    if !snapshot.message.is_empty() {
        line.push_str("  ");
        line.push_str(&snapshot.message);
    }
    line
}

/// Channel lifecycle line; `None` for states not worth printing
pub fn render_channel_status(status: ChannelStatus, attempt: u32) -> Option<String> {
    match status {
        ChannelStatus::Connecting if attempt > 1 => {
            Some(format!("Reconnecting to notifications (attempt {})", attempt))
        }
        ChannelStatus::Connecting => None,
        ChannelStatus::Connected => Some("Connected to notifications".to_string()),
        ChannelStatus::Disconnected => Some("Disconnected from notifications".to_string()),
        ChannelStatus::Abandoned => {
            Some("Notifications unavailable; live progress will not be shown".to_string())
        }
    }
}
