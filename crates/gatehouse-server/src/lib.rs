//! HTTP shell for the Gatehouse access-control API.
//!
//! Wraps [`gatehouse_api::api_router`] under `/api` with Basic
//! authentication and request tracing, and owns the runtime configuration.
//! The domain surface itself lives in `gatehouse-api`; this crate only
//! decides who may reach it and how the process is wired together.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  extract::{Request, State},
  middleware::{self, Next},
  response::Response,
};
use gatehouse_api::ApiState;
use gatehouse_core::{
  directory::Directory, gate::DEFAULT_PASS_TTL_MINUTES, store::AccessStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, verify_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// HMAC secret for pass signatures. Must be non-empty; rotating it
  /// invalidates every outstanding unexpired pass.
  pub signing_secret:     String,
  /// Resident pass lifetime in minutes.
  #[serde(default = "default_pass_ttl_minutes")]
  pub pass_ttl_minutes:   i64,
  pub auth_username:      String,
  pub auth_password_hash: String,
}

fn default_pass_ttl_minutes() -> i64 {
  DEFAULT_PASS_TTL_MINUTES
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the auth layer. API handlers receive their
/// own [`ApiState`] slice when the inner router is built.
#[derive(Clone)]
pub struct AppState<S> {
  pub api:    ApiState<S>,
  pub config: Arc<ServerConfig>,
  pub auth:   Arc<AuthConfig>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the authenticated server router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: AccessStore + Directory + Clone + Send + Sync + 'static,
{
  Router::new()
    .nest("/api", gatehouse_api::api_router(state.api.clone()))
    .layer(middleware::from_fn_with_state(state, require_auth::<S>))
    .layer(TraceLayer::new_for_http())
}

/// Rejects the request before it reaches any handler unless it carries
/// valid Basic credentials.
async fn require_auth<S>(
  State(state): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Result<Response, Error>
where
  S: AccessStore + Directory + Clone + Send + Sync + 'static,
{
  verify_auth(req.headers(), &state.auth)?;
  Ok(next.run(req).await)
}

// ─── Integration tests ────────────────────────────────────────────────────────
