//! Google OAuth 2.0 authorization-code flow.
//!
//! Reads the OAuth client from a Google Cloud `credentials.json` file,
//! builds the authorization URL (with CSRF state and PKCE), exchanges the
//! callback code for tokens, refreshes access tokens, and revokes grants.
//! Tokens are persisted through [`TokenStore`](super::TokenStore).

use chrono::{Duration, Utc};
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::{AuthError, StoredToken, TokenStore};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Scopes the tool requests: mailbox modification (read, label, mark read),
/// sending, and calendar event creation.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/calendar.events",
];

/// OAuth client configuration loaded from `credentials.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// Wire shape of a Google `credentials.json`: the client sits under a
/// `web` or `installed` key depending on how it was created.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    web: Option<OAuthConfig>,
    installed: Option<OAuthConfig>,
}

impl OAuthConfig {
    /// Loads the OAuth client from a Google `credentials.json` file.
    pub fn from_credentials_file(path: &Path) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|e| AuthError::Credentials {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&json).map_err(|e| AuthError::Credentials {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        file.web
            .or(file.installed)
            .ok_or_else(|| AuthError::Credentials {
                path: path.to_path_buf(),
                message: "no `web` or `installed` client in credentials file".to_string(),
            })
    }

    /// The redirect URI sent to Google. Prefers the first configured URI,
    /// falling back to `<external_url>/oauth2callback`.
    pub fn redirect_uri(&self, external_url: &str) -> String {
        self.redirect_uris
            .first()
            .cloned()
            .unwrap_or_else(|| format!("{}/oauth2callback", external_url.trim_end_matches('/')))
    }
}

/// Google token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
}

/// In-flight authorization attempt, kept between `/auth` and the callback.
struct PendingAuthorization {
    state: String,
    pkce_verifier: String,
}

/// Drives the OAuth authorization-code flow for one client.
pub struct OAuthFlow {
    config: OAuthConfig,
    redirect_uri: String,
    client: reqwest::Client,
    store: TokenStore,
    pending: Mutex<Option<PendingAuthorization>>,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig, external_url: &str, store: TokenStore) -> Self {
        let redirect_uri = config.redirect_uri(external_url);
        Self {
            config,
            redirect_uri,
            client: reqwest::Client::new(),
            store,
            pending: Mutex::new(None),
        }
    }

    /// Returns the token store backing this flow.
    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Builds the Google authorization URL and records state + PKCE
    /// verifier for the upcoming callback.
    pub fn authorize_url(&self) -> Result<String, AuthError> {
        let state = random_token();
        let pkce_verifier = random_token();
        let pkce_challenge = pkce_challenge_s256(&pkce_verifier);

        let mut url = url::Url::parse(GOOGLE_AUTH_URL)
            .map_err(|e| AuthError::Flow(format!("invalid auth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", &pkce_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent");

        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(PendingAuthorization {
            state,
            pkce_verifier,
        });

        debug!("built authorization URL");
        Ok(url.to_string())
    }

    /// Exchanges the callback authorization code for tokens, validating the
    /// CSRF state, and persists the result.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<StoredToken, AuthError> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| AuthError::Flow("no authorization in progress".to_string()))?;

        if pending.state != state {
            return Err(AuthError::Flow("state mismatch in callback".to_string()));
        }

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("code_verifier", pending.pkce_verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let token = self.request_token(&params).await?;
        self.store.save(&token)?;
        info!("authorization complete, token stored");
        Ok(token)
    }

    /// Refreshes an access token from a refresh token and persists the
    /// rotated pair immediately.
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, AuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let mut token = self.request_token(&params).await?;
        // Google omits the refresh token on refresh responses; keep the old one.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        self.store.save(&token)?;
        debug!("access token refreshed");
        Ok(token)
    }

    /// Returns a valid access token, refreshing the stored one if expired.
    /// Fails with [`AuthError::NotAuthorized`] when no token is stored.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let stored = self.store.load()?.ok_or(AuthError::NotAuthorized)?;
        if !stored.is_expired() {
            return Ok(stored.access_token);
        }
        let refresh_token = stored.refresh_token.ok_or(AuthError::NotAuthorized)?;
        let refreshed = self.refresh(&refresh_token).await?;
        Ok(refreshed.access_token)
    }

    /// Revokes the stored grant at Google and deletes the token file.
    pub async fn revoke(&self) -> Result<(), AuthError> {
        if let Some(token) = self.store.load()? {
            let revoke_with = token
                .refresh_token
                .clone()
                .unwrap_or_else(|| token.access_token.clone());
            let response = self
                .client
                .post(GOOGLE_REVOKE_URL)
                .form(&[("token", revoke_with.as_str())])
                .send()
                .await
                .map_err(|e| AuthError::Http(e.to_string()))?;

            // A 400 usually means the grant is already invalid; clearing the
            // local file is still the right outcome.
            if !response.status().is_success() {
                debug!(status = %response.status(), "revoke endpoint rejected token");
            }
        }
        self.store.clear()?;
        info!("credentials revoked");
        Ok(())
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<StoredToken, AuthError> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Flow(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Flow(format!("invalid token response: {e}")))?;

        Ok(StoredToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Some(Utc::now() + Duration::seconds(token.expires_in)),
            scopes: token
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_else(|| SCOPES.iter().map(|s| s.to_string()).collect()),
        })
    }
}

/// Generate a cryptographically random URL-safe token.
fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.r#gen()).collect();
    base64_url_encode(&bytes)
}

/// Compute the PKCE S256 code challenge from a verifier.
fn pkce_challenge_s256(verifier: &str) -> String {
    use sha2::Digest;
    let hash = sha2::Sha256::digest(verifier.as_bytes());
    base64_url_encode(&hash)
}

fn base64_url_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "client-id.apps.example".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uris: vec![],
        }
    }

    fn flow_with_dir(dir: &Path) -> OAuthFlow {
        OAuthFlow::new(
            config(),
            "http://localhost:8080",
            TokenStore::new(dir.join("token.json")),
        )
    }

    #[test]
    fn credentials_file_accepts_web_and_installed() {
        let dir = tempfile::tempdir().unwrap();

        let web = dir.path().join("web.json");
        std::fs::write(
            &web,
            r#"{"web": {"client_id": "id", "client_secret": "secret",
                "redirect_uris": ["http://localhost:8080/oauth2callback"]}}"#,
        )
        .unwrap();
        let cfg = OAuthConfig::from_credentials_file(&web).unwrap();
        assert_eq!(cfg.client_id, "id");
        assert_eq!(
            cfg.redirect_uri("http://ignored.example"),
            "http://localhost:8080/oauth2callback"
        );

        let installed = dir.path().join("installed.json");
        std::fs::write(
            &installed,
            r#"{"installed": {"client_id": "id2", "client_secret": "secret2"}}"#,
        )
        .unwrap();
        let cfg = OAuthConfig::from_credentials_file(&installed).unwrap();
        assert_eq!(cfg.client_id, "id2");
        assert_eq!(
            cfg.redirect_uri("http://localhost:9000/"),
            "http://localhost:9000/oauth2callback"
        );
    }

    #[test]
    fn credentials_file_missing_client_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            OAuthConfig::from_credentials_file(&path),
            Err(AuthError::Credentials { .. })
        ));
    }

    #[test]
    fn authorize_url_carries_required_params() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_with_dir(dir.path());

        let url = flow.authorize_url().unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().collect();

        assert_eq!(pairs["client_id"], "client-id.apps.example");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert!(pairs["scope"].contains("gmail.modify"));
        assert!(!pairs["state"].is_empty());
    }

    #[tokio::test]
    async fn callback_without_pending_flow_fails() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_with_dir(dir.path());
        let result = flow.exchange_code("code", "state").await;
        assert!(matches!(result, Err(AuthError::Flow(_))));
    }

    #[tokio::test]
    async fn callback_with_wrong_state_fails() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_with_dir(dir.path());
        flow.authorize_url().unwrap();
        let result = flow.exchange_code("code", "attacker-state").await;
        assert!(matches!(result, Err(AuthError::Flow(_))));
    }

    #[tokio::test]
    async fn access_token_without_stored_token_is_not_authorized() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_with_dir(dir.path());
        assert!(matches!(
            flow.access_token().await,
            Err(AuthError::NotAuthorized)
        ));
    }

    #[test]
    fn pkce_challenge_is_deterministic() {
        // RFC 7636 appendix B test vector.
        assert_eq!(
            pkce_challenge_s256("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
