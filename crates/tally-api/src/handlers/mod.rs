//! Route handlers and the helpers they share.

pub mod analytics;
pub mod exports;
pub mod responses;
pub mod surveys;

use std::{
  convert::Infallible,
  net::{IpAddr, SocketAddr},
};

use axum::{
  Json,
  extract::{ConnectInfo, FromRequestParts, OriginalUri},
  http::{header, request::Parts},
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::{range::DateRange, store::SurveyStore, survey::Survey};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{Actor, Role},
  error::ApiError,
  rate_limit::{Decision, Endpoint, bucket_key},
};

pub(crate) const NOT_FOUND: &str = "Not found";

/// `GET /api/health`
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

// ─── Path and query parameters ───────────────────────────────────────────────

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
  Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid survey id: {raw:?}")))
}

/// `?startDate=…&endDate=…`, kept verbatim for export metadata.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateParams {
  pub start_date: Option<String>,
  pub end_date:   Option<String>,
}

impl DateParams {
  pub(crate) fn range(&self) -> Result<DateRange, ApiError> {
    Ok(DateRange::parse(self.start_date.as_deref(), self.end_date.as_deref())?)
  }
}

// ─── Survey lookup ───────────────────────────────────────────────────────────

pub(crate) async fn load_survey<S>(state: &AppState<S>, id: Uuid) -> Result<Survey, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  state
    .store
    .get_survey(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_owned()))
}

/// Like [`load_survey`], but unpublished surveys do not exist for students.
pub(crate) async fn visible_survey<S>(
  state: &AppState<S>,
  actor: &Actor,
  id: Uuid,
) -> Result<Survey, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let survey = load_survey(state, id).await?;
  if actor.role == Role::Student && !survey.is_published {
    return Err(ApiError::NotFound(NOT_FOUND.to_owned()));
  }
  Ok(survey)
}

// ─── Rate limiting ───────────────────────────────────────────────────────────

/// Request path and peer address, as used in rate-limit bucket keys.
#[derive(Debug, Clone)]
pub struct ClientInfo {
  pub path: String,
  pub ip:   Option<IpAddr>,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
    let path = parts
      .extensions
      .get::<OriginalUri>()
      .map_or_else(|| parts.uri.path().to_owned(), |uri| uri.path().to_owned());
    let ip = parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.ip());
    Ok(Self { path, ip })
  }
}

/// Record a hit for `actor` on `endpoint`, failing with `RateLimited` once
/// the role's window is exhausted.
pub(crate) async fn enforce_limit<S>(
  state: &AppState<S>,
  actor: &Actor,
  client: &ClientInfo,
  endpoint: Endpoint,
) -> Result<(), ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let window = state.config.rate_limits.policy(endpoint).window(Some(actor.role));
  let key = bucket_key(Some(actor), client.ip, &client.path);

  match state.limiter.check(&key, window).await {
    Decision::Admitted => Ok(()),
    Decision::Rejected { retry_after } => {
      tracing::info!(key, retry_after, ?endpoint, "rate limited");
      Err(ApiError::RateLimited { retry_after })
    }
  }
}

// ─── Downloads ───────────────────────────────────────────────────────────────

pub(crate) fn attachment(
  content_type: &str,
  filename: String,
  body: impl IntoResponse,
) -> Response {
  (
    [
      (header::CONTENT_TYPE, content_type.to_owned()),
      (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
    ],
    body,
  )
    .into_response()
}
