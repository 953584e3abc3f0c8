//! Event types for the CHLB event system
//!
//! Provides the tracker event definitions and the EventBus every consumer
//! (progress renderer, achievement list, upload form) subscribes to.

// Sub-modules (supporting types)
mod session_types;

pub use session_types::{Achievement, AchievementError, SessionSnapshot};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle of the real-time notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Connection attempt in flight
    Connecting,
    /// Namespace connected (and room joined when an identity is known)
    Connected,
    /// Connection lost; a reconnect may follow
    Disconnected,
    /// Retry budget exhausted; no further push events will arrive
    Abandoned,
}

/// Tracker event types
///
/// Every session mutation is published as a full snapshot. There is no partial
/// update or filtering: subscribers re-render on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    /// Upload session state changed
    SessionChanged {
        /// State after the change
        snapshot: SessionSnapshot,
    },

    /// Real-time channel status changed
    ChannelStatusChanged {
        status: ChannelStatus,
        /// Attempt number for `Connecting` (1-based), 0 otherwise
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for tracker events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the tracker)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use chlb_common::events::{EventBus, TrackerEvent, ChannelStatus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(TrackerEvent::ChannelStatusChanged {
///     status: ChannelStatus::Connected,
///     attempt: 0,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(
///     rx.try_recv(),
///     Ok(TrackerEvent::ChannelStatusChanged { status: ChannelStatus::Connected, .. })
/// ));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers
    ///   start skipping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TrackerEvent) {
        let _ = self.tx.send(event);
    }
}
