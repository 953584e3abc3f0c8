//! Real-time notification channel
//!
//! A Socket.IO client (websocket transport only) that joins the user's
//! notification room and feeds processing signals into the tracker.

pub mod channel;
pub mod packet;

pub use channel::{websocket_url, RealtimeChannel};
pub use packet::{EnginePacket, OpenHandshake, SocketPacket};

use thiserror::Error;

/// Real-time channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed by server")]
    Closed,

    #[error("No traffic from server for {0} ms")]
    Timeout(u64),

    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::WebSocket(err.to_string())
    }
}
