//! HTTP surface: OAuth flow endpoints and the rule-configuration API.
//!
//! A small axum router drives the browser side of authorization and lets
//! the bundled config form read and write the category rules:
//!
//! - `GET  /`               service banner
//! - `GET  /auth`           redirect to Google's consent screen
//! - `GET  /oauth2callback` code exchange, token persisted on success
//! - `POST /revoke`         revoke the grant and delete the token file
//! - `GET  /api/config`     category rules as JSON
//! - `POST /api/config`     validate and persist category rules
//!
//! The same router serves `sift serve` (long-running) and `sift auth`
//! (shut down as soon as a token lands).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::OAuthFlow;
use crate::config::Settings;
use crate::domain::{CategoryRule, RuleSet};

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Where settings are persisted on config edits.
    pub settings_path: PathBuf,
    /// Live settings, shared with nothing else while serving.
    pub settings: Arc<RwLock<Settings>>,
    /// OAuth flow driving /auth and /oauth2callback.
    pub flow: Arc<OAuthFlow>,
    /// Notified once a token has been stored (lets `sift auth` exit).
    pub authorized: Arc<Notify>,
}

impl AppState {
    pub fn new(settings_path: PathBuf, settings: Settings, flow: Arc<OAuthFlow>) -> Self {
        Self {
            settings_path,
            settings: Arc::new(RwLock::new(settings)),
            flow,
            authorized: Arc::new(Notify::new()),
        }
    }
}

/// Builds the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/auth", get(auth))
        .route("/oauth2callback", get(oauth2callback))
        .route("/revoke", post(revoke))
        .route("/api/config", get(get_config).post(post_config))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router on `bind` until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    bind: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn index() -> &'static str {
    "sift: gmail triage service\n"
}

/// Starts the OAuth flow by bouncing the browser to Google.
async fn auth(State(state): State<AppState>) -> Response {
    match state.flow.authorize_url() {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => {
            error!(error = %e, "failed to build authorization URL");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Handles the redirect back from Google.
async fn oauth2callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        error!(%error, "oauth callback returned an error");
        let hint = format!(
            "Authorization failed: {error}\n\nCommon causes:\n\
             1. Redirect URI mismatch with the Google Cloud Console\n\
             2. OAuth client not fully configured\n"
        );
        return (StatusCode::BAD_REQUEST, hint).into_response();
    }

    let (Some(code), Some(csrf_state)) = (params.code, params.state) else {
        return (
            StatusCode::BAD_REQUEST,
            "No authorization code received".to_string(),
        )
            .into_response();
    };

    match state.flow.exchange_code(&code, &csrf_state).await {
        Ok(_) => {
            state.authorized.notify_waiters();
            (
                StatusCode::OK,
                "Authorization complete. You can close this window.".to_string(),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "code exchange failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Revokes the stored grant and deletes the token file.
async fn revoke(State(state): State<AppState>) -> Response {
    match state.flow.revoke().await {
        Ok(()) => (StatusCode::OK, "Credentials revoked.\n".to_string()).into_response(),
        Err(e) => {
            error!(error = %e, "revoke failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Returns the category rules for the config form.
async fn get_config(State(state): State<AppState>) -> Json<Vec<CategoryRule>> {
    Json(state.settings.read().await.rules.clone())
}

/// Validates and persists edited category rules.
async fn post_config(
    State(state): State<AppState>,
    Json(rules): Json<Vec<CategoryRule>>,
) -> Response {
    if let Err(e) = RuleSet::new(rules.clone()).validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response();
    }

    let mut settings = state.settings.write().await;
    settings.rules = rules;
    if let Err(e) = settings.save(&state.settings_path) {
        error!(error = %e, "failed to persist settings");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    info!(rules = settings.rules.len(), "configuration updated");
    Json(settings.rules.clone()).into_response()
}
