//! chlb-upload library interface
//!
//! Upload progress tracking for the leaderboard client: the session state
//! machine, the status probe and upload collaborators, the real-time channel
//! and a line renderer used by the binary.

pub mod error;
pub mod models;
pub mod progress_view;
pub mod realtime;
pub mod services;
pub mod tracker;

pub use crate::error::{ClientError, ClientResult};
pub use crate::models::{ProcessingSignal, UploadOutcome, UploadPhase, UploadSession};
pub use crate::tracker::{TrackerHandle, UploadProgressTracker};
