//! OAuth 2.0 authentication against Google.
//!
//! The flow is the standard authorization-code dance: `sift auth` (or the
//! `/auth` route) sends the user to Google, the `/oauth2callback` route
//! exchanges the code, and the resulting token pair is stored in a flat
//! JSON file. Everything downstream asks [`OAuthFlow::access_token`] for a
//! bearer token and never touches the refresh machinery directly.

mod oauth;
mod token_store;

use std::path::PathBuf;

pub use oauth::{OAuthConfig, OAuthFlow, SCOPES};
pub use token_store::{StoredToken, TokenStore};

/// Errors from the authentication layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The OAuth client file is missing or malformed.
    #[error("cannot load OAuth client from {path}: {message}")]
    Credentials { path: PathBuf, message: String },

    /// No stored token; the user must run `sift auth`.
    #[error("not authorized; run `sift auth` first")]
    NotAuthorized,

    /// The authorization flow failed (state mismatch, token endpoint error).
    #[error("authorization flow failed: {0}")]
    Flow(String),

    /// Token file I/O failed.
    #[error("token store error: {0}")]
    TokenStore(String),

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(String),
}
