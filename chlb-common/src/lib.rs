//! # CHLB Common Library
//!
//! Shared code for the leaderboard client crates including:
//! - Error types
//! - Configuration loading and resolution
//! - Persisted local identity (user id and bearer token)
//! - Event types (TrackerEvent enum) and the EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod identity;

pub use error::{Error, Result};
pub use identity::LocalIdentity;
