//! Response submission, the caller's own response, and the staff listing.

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
  http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::{
  response::{Answers, NewResponse},
  store::{Order, ResponseQuery, SubmitOutcome, SurveyStore},
  survey::Survey,
};

use super::{NOT_FOUND, load_survey, parse_id, visible_survey};
use crate::{
  AppState,
  auth::{Actor, Role},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct Submission {
  pub data: Answers,
}

/// Students only answer published surveys; nobody answers a completed one.
fn ensure_open(survey: &Survey, actor: &Actor) -> Result<(), ApiError> {
  if actor.role == Role::Student && !survey.is_published {
    return Err(ApiError::Forbidden("Forbidden".to_owned()));
  }
  if survey.is_completed {
    return Err(ApiError::Forbidden("Survey is closed".to_owned()));
  }
  Ok(())
}

/// `POST /api/surveys/{id}/submit`
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
  payload: Result<Json<Submission>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let id = parse_id(&id)?;
  let Json(body) = payload?;

  let survey = load_survey(&state, id).await?;
  ensure_open(&survey, &actor)?;
  survey.questions.check_required(&body.data)?;

  let input = NewResponse::for_survey(&survey, Some(&actor.username), body.data);
  match state.store.submit_response(input).await.map_err(ApiError::store)? {
    SubmitOutcome::Created(response) => {
      tracing::info!(survey_id = %id, response_id = %response.id, "response submitted");
      Ok((StatusCode::CREATED, Json(json!({ "responseId": response.id }))))
    }
    SubmitOutcome::AlreadySubmitted => {
      Err(ApiError::Conflict("You have already submitted this survey".to_owned()))
    }
  }
}

/// `GET /api/surveys/{id}/response`
pub async fn mine<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let survey = visible_survey(&state, &actor, parse_id(&id)?).await?;
  let response = state
    .store
    .find_respondent_response(survey.id, &actor.username)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_owned()))?;
  Ok(Json(json!({ "response": response })))
}

/// `PUT /api/surveys/{id}/response`
pub async fn update_mine<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
  payload: Result<Json<Submission>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let id = parse_id(&id)?;
  let Json(body) = payload?;

  let survey = load_survey(&state, id).await?;
  ensure_open(&survey, &actor)?;
  survey.questions.check_required(&body.data)?;

  let existing = state
    .store
    .find_respondent_response(id, &actor.username)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_owned()))?;

  let response = state
    .store
    .update_response_answers(existing.id, body.data)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_owned()))?;

  tracing::info!(survey_id = %id, response_id = %response.id, "response updated");
  Ok(Json(json!({ "response": response })))
}

/// `GET /api/surveys/{id}/responses`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  let survey = load_survey(&state, parse_id(&id)?).await?;

  let query = ResponseQuery { order: Order::Newest, ..Default::default() };
  let items = state
    .store
    .find_responses(survey.id, query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "count": items.len(), "items": items })))
}
