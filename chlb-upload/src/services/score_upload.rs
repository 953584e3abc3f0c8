//! Score data upload
//!
//! Sends `scoredata.bin` to the backend and records the outcome in the
//! tracker. The backend replies as soon as the file is stored and starts
//! processing in the background; progress then arrives over the real-time
//! channel.

use chlb_common::config::SCOREDATA_FILE_NAME;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::models::UploadOutcome;
use crate::tracker::UploadProgressTracker;

const UPLOAD_PATH: &str = "/api/upload_scoredata";
const USER_AGENT: &str = concat!("chlb-upload/", env!("CARGO_PKG_VERSION"));

/// Largest file the backend accepts
pub const MAX_UPLOAD_BYTES: u64 = 1024 * 1024;

pub const NO_FILE_MESSAGE: &str = "Please select a file";
pub const PROCESSING_FAILED_MESSAGE: &str = "An error occurred while processing the file";
pub const TRANSPORT_FAILED_MESSAGE: &str = "An error occurred while uploading the file";
const NO_TOKEN_MESSAGE: &str = "No token provided";
const WRONG_NAME_MESSAGE: &str = "File must be named scoredata.bin";
const TOO_LARGE_MESSAGE: &str = "File size exceeds 1 MB limit";

/// Body of the upload response (either shape)
#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    total_songs: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// Accepted upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    /// Song count reported by the backend
    pub total_songs: Option<u64>,
    /// Message recorded in the session
    pub message: String,
}

/// Uploads score files on behalf of one tracker
pub struct ScoreUploader {
    http_client: reqwest::Client,
    api_url: String,
    tracker: UploadProgressTracker,
}

impl ScoreUploader {
    pub fn new(api_url: &str, tracker: UploadProgressTracker) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: api_url.to_string(),
            tracker,
        })
    }

    /// Upload a score file and record the outcome in the tracker
    ///
    /// The session moves to uploading before any validation so that every
    /// failure, local or remote, is reported through the same `failed` state.
    /// A missing file fails without starting an attempt.
    pub async fn upload(
        &self,
        file: Option<&Path>,
        auth_token: Option<&str>,
    ) -> ClientResult<UploadReceipt> {
        let Some(path) = file else {
            self.tracker
                .finish_upload(NO_FILE_MESSAGE, UploadOutcome::Error)
                .await;
            return Err(ClientError::InvalidFile(NO_FILE_MESSAGE.to_string()));
        };

        let attempt_id = Uuid::new_v4();
        let generation = self.tracker.start_upload().await;
        info!(attempt_id = %attempt_id, file = %path.display(), "Uploading score data");

        match self.send(path, auth_token).await {
            Ok(receipt) => {
                info!(
                    attempt_id = %attempt_id,
                    total_songs = receipt.total_songs.unwrap_or(0),
                    "Upload accepted"
                );
                self.tracker
                    .finish_upload_if_current(generation, &receipt.message, UploadOutcome::Success)
                    .await;
                Ok(receipt)
            }
            Err(e) => {
                warn!(attempt_id = %attempt_id, "Upload failed: {}", e);
                let message = failure_message(&e);
                self.tracker
                    .finish_upload_if_current(generation, &message, UploadOutcome::Error)
                    .await;
                Err(e)
            }
        }
    }

    async fn send(&self, path: &Path, auth_token: Option<&str>) -> ClientResult<UploadReceipt> {
        let token = auth_token.ok_or(ClientError::MissingToken)?;
        let bytes = read_scoredata(path).await?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(SCOREDATA_FILE_NAME)
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}{}", self.api_url, UPLOAD_PATH);
        debug!(url = %url, "POST score data");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        if !status.is_success() {
            let message = body
                .error
                .unwrap_or_else(|| PROCESSING_FAILED_MESSAGE.to_string());
            return Err(ClientError::Api(status.as_u16(), message));
        }

        if let Some(server_message) = &body.message {
            debug!(message = %server_message, "Backend accepted upload");
        }

        let total = body
            .total_songs
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(UploadReceipt {
            total_songs: body.total_songs,
            message: format!("Upload complete. Processing started. Total songs: {}", total),
        })
    }
}

/// Read the file after the same checks the backend applies
async fn read_scoredata(path: &Path) -> ClientResult<Vec<u8>> {
    let name_ok = path
        .file_name()
        .map(|name| name == SCOREDATA_FILE_NAME)
        .unwrap_or(false);
    if !name_ok {
        return Err(ClientError::InvalidFile(WRONG_NAME_MESSAGE.to_string()));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_UPLOAD_BYTES {
        return Err(ClientError::InvalidFile(TOO_LARGE_MESSAGE.to_string()));
    }

    Ok(tokio::fs::read(path).await?)
}

/// Message shown to the user for a failed upload
pub fn failure_message(error: &ClientError) -> String {
    match error {
        ClientError::Api(_, message) | ClientError::InvalidFile(message) => message.clone(),
        ClientError::MissingToken => NO_TOKEN_MESSAGE.to_string(),
        _ => TRANSPORT_FAILED_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            failure_message(&ClientError::Api(400, "Score data is outdated".to_string())),
            "Score data is outdated"
        );
        assert_eq!(
            failure_message(&ClientError::Network("connection refused".to_string())),
            TRANSPORT_FAILED_MESSAGE
        );
        assert_eq!(
            failure_message(&ClientError::Parse("expected value".to_string())),
            TRANSPORT_FAILED_MESSAGE
        );
        assert_eq!(failure_message(&ClientError::MissingToken), "No token provided");
    }

    #[tokio::test]
    async fn test_rejects_wrong_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.bin");
        std::fs::write(&path, b"data").unwrap();

        let err = read_scoredata(&path).await.unwrap_err();
        assert_eq!(failure_message(&err), WRONG_NAME_MESSAGE);
    }

    #[tokio::test]
    async fn test_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SCOREDATA_FILE_NAME);
        std::fs::write(&path, vec![0u8; MAX_UPLOAD_BYTES as usize + 1]).unwrap();

        let err = read_scoredata(&path).await.unwrap_err();
        assert_eq!(failure_message(&err), TOO_LARGE_MESSAGE);
    }

    #[tokio::test]
    async fn test_accepts_file_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SCOREDATA_FILE_NAME);
        std::fs::write(&path, vec![0u8; MAX_UPLOAD_BYTES as usize]).unwrap();

        let bytes = read_scoredata(&path).await.unwrap();
        assert_eq!(bytes.len() as u64, MAX_UPLOAD_BYTES);
    }
}
