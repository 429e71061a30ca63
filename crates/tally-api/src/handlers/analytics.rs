//! `GET /api/surveys/{id}/analytics`

use axum::{
  Json,
  extract::{Path, Query, State},
};
use tally_core::{
  analytics::{SurveyAnalytics, summarize},
  store::{ResponseQuery, SurveyStore},
};

use super::{ClientInfo, DateParams, enforce_limit, load_survey, parse_id};
use crate::{AppState, auth::Actor, error::ApiError, rate_limit::Endpoint};

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  client: ClientInfo,
  Path(id): Path<String>,
  Query(params): Query<DateParams>,
) -> Result<Json<SurveyAnalytics>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  enforce_limit(&state, &actor, &client, Endpoint::Analytics).await?;

  let range = params.range()?;
  let survey = load_survey(&state, parse_id(&id)?).await?;

  let responses = state
    .store
    .find_responses(survey.id, ResponseQuery { range, ..Default::default() })
    .await
    .map_err(ApiError::store)?;

  Ok(Json(summarize(&survey.questions, &responses)))
}
