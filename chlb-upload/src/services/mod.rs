//! HTTP collaborators of the tracker

pub mod score_upload;
pub mod status_probe;

pub use score_upload::{ScoreUploader, UploadReceipt};
pub use status_probe::{ProcessingStatus, StatusProbeClient};
