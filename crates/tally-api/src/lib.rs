//! HTTP gateway for Tally.
//!
//! Exposes an axum [`Router`] serving the survey, response, analytics and
//! export routes under `/api`, backed by any [`SurveyStore`].

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tally_core::store::SurveyStore;
use tower_http::{
  request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
  trace::TraceLayer,
};

use auth::{Account, AuthConfig};
use handlers::{analytics, exports, responses, surveys};
use rate_limit::{RateLimitConfig, RateLimiter};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:        String,
  pub port:        u16,
  pub store_path:  PathBuf,
  #[serde(default)]
  pub accounts:    Vec<Account>,
  #[serde(default)]
  pub rate_limits: RateLimitConfig,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: SurveyStore> {
  pub store:   Arc<S>,
  pub config:  Arc<ServerConfig>,
  pub auth:    Arc<AuthConfig>,
  pub limiter: Arc<RateLimiter>,
}

impl<S: SurveyStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      config:  Arc::clone(&self.config),
      auth:    Arc::clone(&self.auth),
      limiter: Arc::clone(&self.limiter),
    }
  }
}

impl<S: SurveyStore> AppState<S> {
  pub fn new(store: S, config: ServerConfig, limiter: RateLimiter) -> Self {
    Self {
      store:   Arc::new(store),
      auth:    Arc::new(AuthConfig::new(config.accounts.clone())),
      config:  Arc::new(config),
      limiter: Arc::new(limiter),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Tally API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let api = Router::new()
    .route("/health", get(handlers::health))
    .route("/surveys", get(surveys::list::<S>).post(surveys::create::<S>))
    .route(
      "/surveys/{id}",
      get(surveys::get::<S>)
        .put(surveys::update::<S>)
        .delete(surveys::delete::<S>),
    )
    .route("/surveys/{id}/publish",     post(surveys::publish::<S>))
    .route("/surveys/{id}/complete",    post(surveys::complete::<S>))
    .route("/surveys/{id}/submit",      post(responses::submit::<S>))
    .route(
      "/surveys/{id}/response",
      get(responses::mine::<S>).put(responses::update_mine::<S>),
    )
    .route("/surveys/{id}/responses",   get(responses::list::<S>))
    .route("/surveys/{id}/analytics",   get(analytics::handler::<S>))
    .route("/surveys/{id}/export.csv",  get(exports::csv::<S>))
    .route("/surveys/{id}/export.xlsx", get(exports::xlsx::<S>))
    .route("/surveys/{id}/export.pdf",  get(exports::pdf::<S>))
    .with_state(state);

  Router::new()
    .nest("/api", api)
    .layer(PropagateRequestIdLayer::x_request_id())
    .layer(TraceLayer::new_for_http())
    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

// ─── Integration tests ────────────────────────────────────────────────────────
