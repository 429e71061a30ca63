//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{ "error": "<message>" }` with the matching status.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("rate limited; retry after {retry_after}s")]
  RateLimited { retry_after: u64 },

  #[error("export error: {0}")]
  Export(#[from] tally_export::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Wrap any store backend error.
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<tally_core::Error> for ApiError {
  fn from(e: tally_core::Error) -> Self {
    if e.is_validation() {
      Self::BadRequest(e.to_string())
    } else {
      Self::store(e)
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::RateLimited { .. } => {
        (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_owned())
      }
      ApiError::Export(e) => {
        tracing::error!(error = %e, "export rendering failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store operation failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    match self {
      ApiError::Unauthorized => {
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"tally\""),
        );
      }
      ApiError::RateLimited { retry_after } => {
        res.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
      }
      _ => {}
    }
    res
  }
}
