//! Data models for chlb-upload
//!
//! - Upload session state machine
//! - Server-pushed processing signals and their dispatch table

pub mod signals;
pub mod upload_session;

pub use signals::{decode_signal, ProcessingSignal, SignalError, SIGNAL_TABLE};
pub use upload_session::{StateTransition, UploadOutcome, UploadPhase, UploadSession};
