//! CSV, XLSX and PDF downloads.
//!
//! Each export runs the same preamble: role check, rate limit, date-range
//! validation, survey lookup. CSV and XLSX carry the raw response table; the
//! PDF carries only the likert histograms, computed by its own aggregation
//! pass over the same range.

use axum::{
  extract::{Path, Query, State},
  response::Response,
};
use chrono::Utc;
use tally_core::{
  analytics::summarize,
  response::Response as SurveyResponse,
  store::{ResponseQuery, SurveyStore},
  survey::Survey,
};
use tally_export::{ExportMeta, ResponseTable, render_csv, render_pdf, render_xlsx};

use super::{ClientInfo, DateParams, attachment, enforce_limit, load_survey, parse_id};
use crate::{AppState, auth::Actor, error::ApiError, rate_limit::Endpoint};

const CSV: &str = "text/csv; charset=utf-8";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const PDF: &str = "application/pdf";

struct Export {
  survey:    Survey,
  meta:      ExportMeta,
  responses: Vec<SurveyResponse>,
}

impl Export {
  fn filename(&self, extension: &str) -> String { format!("survey-{}.{extension}", self.survey.id) }
}

async fn prepare<S>(
  state: &AppState<S>,
  actor: &Actor,
  client: &ClientInfo,
  endpoint: Endpoint,
  id: &str,
  params: &DateParams,
) -> Result<Export, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  enforce_limit(state, actor, client, endpoint).await?;

  let range = params.range()?;
  let survey = load_survey(state, parse_id(id)?).await?;

  let responses = state
    .store
    .find_responses(survey.id, ResponseQuery { range, ..Default::default() })
    .await
    .map_err(ApiError::store)?;

  let meta = ExportMeta::new(
    &survey,
    params.start_date.as_deref(),
    params.end_date.as_deref(),
    Utc::now(),
  );
  tracing::info!(
    survey_id = %survey.id,
    rows = responses.len(),
    ?endpoint,
    requested_by = %actor.username,
    "export generated"
  );

  Ok(Export { survey, meta, responses })
}

/// `GET /api/surveys/{id}/export.csv`
pub async fn csv<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  client: ClientInfo,
  Path(id): Path<String>,
  Query(params): Query<DateParams>,
) -> Result<Response, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let export = prepare(&state, &actor, &client, Endpoint::Csv, &id, &params).await?;
  let table = ResponseTable::build(&export.survey.questions, &export.responses);
  let body = render_csv(&export.meta, &table);
  Ok(attachment(CSV, export.filename("csv"), body))
}

/// `GET /api/surveys/{id}/export.xlsx`
pub async fn xlsx<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  client: ClientInfo,
  Path(id): Path<String>,
  Query(params): Query<DateParams>,
) -> Result<Response, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let export = prepare(&state, &actor, &client, Endpoint::Xlsx, &id, &params).await?;
  let table = ResponseTable::build(&export.survey.questions, &export.responses);
  let body = render_xlsx(&export.meta, &table)?;
  Ok(attachment(XLSX, export.filename("xlsx"), body))
}

/// `GET /api/surveys/{id}/export.pdf`
pub async fn pdf<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  client: ClientInfo,
  Path(id): Path<String>,
  Query(params): Query<DateParams>,
) -> Result<Response, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let export = prepare(&state, &actor, &client, Endpoint::Pdf, &id, &params).await?;
  let analytics = summarize(&export.survey.questions, &export.responses);
  let body = render_pdf(&export.meta, &analytics);
  Ok(attachment(PDF, export.filename("pdf"), body))
}
