//! OAuth token persistence with secure file permissions.
//!
//! The token lives in a single JSON file (default
//! `~/.config/sift/token.json`) with 0600 permissions. Rotated refresh
//! tokens are persisted immediately to prevent loss on crash. An
//! unparseable token file is removed and treated as absent, forcing a
//! fresh authorization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::AuthError;

/// A persisted OAuth token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Long-lived refresh token; absent if Google did not return one.
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes granted with this token.
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// Whether the access token is expired (or within a minute of it).
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => at - chrono::Duration::seconds(60) <= Utc::now(),
            None => true,
        }
    }
}

/// Token file manager.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored token. A missing file yields `None`; a corrupt
    /// file is deleted and also yields `None`.
    pub fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthError::TokenStore(e.to_string())),
        };

        match serde_json::from_str(&json) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "removing invalid token file");
                let _ = fs::remove_file(&self.path);
                Ok(None)
            }
        }
    }

    /// Saves the token with 0600 permissions, writing via a temp file then
    /// renaming for atomicity.
    pub fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| AuthError::TokenStore(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(token)
            .map_err(|e| AuthError::TokenStore(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).map_err(|e| AuthError::TokenStore(e.to_string()))?;
        set_file_permissions_0600(&tmp_path)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| AuthError::TokenStore(e.to_string()))?;

        debug!(path = %self.path.display(), "stored token");
        Ok(())
    }

    /// Deletes the token file. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, AuthError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| AuthError::TokenStore(e.to_string()))?;
            debug!(path = %self.path.display(), "deleted token");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Set file permissions to 0600 (owner read/write only).
fn set_file_permissions_0600(path: &Path) -> Result<(), AuthError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).map_err(|e| AuthError::TokenStore(e.to_string()))?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}
