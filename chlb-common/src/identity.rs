//! Persisted local identity
//!
//! The auth flow (outside this workspace) writes the signed-in user's id and
//! bearer token to `identity.toml` in the data directory. The tracker only
//! reads it. A missing file is an anonymous session, not an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// File name of the identity file inside the data directory
pub const IDENTITY_FILE_NAME: &str = "identity.toml";

/// Identity of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// Identity used to join the server-side notification room
    pub user_id: Option<String>,
    /// Bearer token for authenticated REST calls
    pub auth_token: Option<String>,
}

impl LocalIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(user_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            auth_token: Some(auth_token.into()),
        }
        .normalized()
    }

    /// Read the identity file
    ///
    /// Returns an anonymous identity when the file does not exist. A file that
    /// exists but cannot be parsed is an error so the caller can report it.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No identity file at {}", path.display());
            return Ok(Self::anonymous());
        }

        let content = std::fs::read_to_string(path)?;
        let identity: LocalIdentity = toml::from_str(&content)
            .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
        Ok(identity.normalized())
    }

    /// Identity used for the notification room, if any
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }

    /// Blank values count as absent
    fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            user_id: clean(self.user_id),
            auth_token: clean(self.auth_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let identity = LocalIdentity::load(&dir.path().join(IDENTITY_FILE_NAME)).unwrap();
        assert_eq!(identity, LocalIdentity::anonymous());
        assert!(!identity.is_signed_in());
    }

    #[test]
    fn test_load_trims_and_drops_blank_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(IDENTITY_FILE_NAME);
        std::fs::write(&path, "user_id = \" 1234 \"\nauth_token = \"   \"\n").unwrap();

        let identity = LocalIdentity::load(&path).unwrap();
        assert_eq!(identity.user_id(), Some("1234"));
        assert_eq!(identity.auth_token(), None);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(IDENTITY_FILE_NAME);
        std::fs::write(&path, "user_id = [").unwrap();

        let err = LocalIdentity::load(&path).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
