//! Processing status probe
//!
//! Asks the backend whether a processing job is already running for the
//! signed-in user, so a tracker started mid-job can resume the progress bar.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

const STATUS_PATH: &str = "/api/processing_status";
const USER_AGENT: &str = concat!("chlb-upload/", env!("CARGO_PKG_VERSION"));

/// Processing status reported by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessingStatus {
    /// `in_progress`, `pending`, `completed`, `completed_with_errors`, `error`, ...
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub processed: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl ProcessingStatus {
    /// Whether the job is still running and worth resuming
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "in_progress" | "pending")
    }
}

/// Status probe client
pub struct StatusProbeClient {
    http_client: reqwest::Client,
    api_url: String,
}

impl StatusProbeClient {
    /// # Arguments
    /// * `api_url` - Normalized backend base URL (no trailing slash)
    /// * `timeout` - Request timeout for the probe
    pub fn new(api_url: &str, timeout: Duration) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: api_url.to_string(),
        })
    }

    /// Fetch the current processing status
    ///
    /// Returns `Ok(None)` when the backend has no job for this user (404).
    pub async fn fetch_status(&self, auth_token: &str) -> ClientResult<Option<ProcessingStatus>> {
        let url = format!("{}{}", self.api_url, STATUS_PATH);
        tracing::debug!(url = %url, "Probing processing status");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(auth_token)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClientError::Api(status.as_u16(), error_text));
        }

        let processing_status: ProcessingStatus = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        Ok(Some(processing_status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_statuses() {
        let status = |s: &str| ProcessingStatus {
            status: s.to_string(),
            progress: None,
            processed: None,
            total: None,
        };
        assert!(status("in_progress").is_active());
        assert!(status("pending").is_active());
        assert!(!status("completed").is_active());
        assert!(!status("completed_with_errors").is_active());
        assert!(!status("no_active_processing").is_active());
    }

    #[test]
    fn test_status_payload_with_counts() {
        let status: ProcessingStatus = serde_json::from_str(
            r#"{"status": "in_progress", "progress": 62.5, "processed": 5, "total": 8}"#,
        )
        .unwrap();
        assert!(status.is_active());
        assert_eq!(status.progress, Some(62.5));
        assert_eq!(status.total, Some(8));
    }
}
