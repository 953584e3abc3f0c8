//! Error types for chlb-upload
//!
//! The tracker itself never returns errors to its callers; failures of its
//! collaborators are represented as session state. These errors are returned
//! by the HTTP clients and the CLI plumbing around them.

use thiserror::Error;

/// HTTP collaborator error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connect, TLS, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response from the backend
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Local file rejected before any request was made
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// No bearer token in the local identity
    #[error("Not signed in: no auth token available")]
    MissingToken,

    /// Real-time channel could not be set up
    #[error("Real-time channel error: {0}")]
    Channel(#[from] crate::realtime::ChannelError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// chlb-common error
    #[error("Common error: {0}")]
    Common(#[from] chlb_common::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Parse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

/// Result type for HTTP collaborators
pub type ClientResult<T> = Result<T, ClientError>;
