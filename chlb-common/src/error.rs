//! Common error types for CHLB

use thiserror::Error;

/// Common result type for CHLB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the CHLB crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed persisted data (TOML or JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
