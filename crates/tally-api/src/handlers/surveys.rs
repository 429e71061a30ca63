//! Survey CRUD and the publish / complete lifecycle.

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
  http::StatusCode,
};
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tally_core::{
  range::DateRange,
  store::SurveyStore,
  survey::{NewSurvey, QuestionSchema, SurveyPatch},
};

use super::{NOT_FOUND, load_survey, parse_id, visible_survey};
use crate::{AppState, auth::Actor, error::ApiError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSurvey {
  pub title:        String,
  #[serde(default)]
  pub description:  Option<String>,
  #[serde(default)]
  pub is_anonymous: bool,
  pub questions:    Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSurvey {
  pub title:        Option<String>,
  /// `null` clears the description; an absent field leaves it alone.
  #[serde(default, deserialize_with = "nullable")]
  pub description:  Option<Option<String>>,
  pub is_anonymous: Option<bool>,
  pub questions:    Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publish {
  pub is_published: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complete {
  pub is_completed: bool,
}

fn nullable<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
  Option::<String>::deserialize(d).map(Some)
}

/// `GET /api/surveys`
pub async fn list<S>(State(state): State<AppState<S>>, actor: Actor) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let items = state
    .store
    .list_surveys(!actor.is_staff())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "items": items })))
}

/// `POST /api/surveys`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  payload: Result<Json<CreateSurvey>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  let Json(body) = payload?;

  let input = NewSurvey {
    title:        body.title.trim().to_owned(),
    description:  body.description,
    is_anonymous: body.is_anonymous,
    questions:    QuestionSchema::parse(&body.questions)?,
    created_by:   actor.username.clone(),
  };
  input.validate()?;

  let survey = state.store.create_survey(input).await.map_err(ApiError::store)?;
  tracing::info!(survey_id = %survey.id, created_by = %survey.created_by, "survey created");

  Ok((StatusCode::CREATED, Json(json!({ "survey": survey }))))
}

/// `GET /api/surveys/{id}`
pub async fn get<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let survey = visible_survey(&state, &actor, parse_id(&id)?).await?;
  Ok(Json(json!({ "survey": survey })))
}

/// `PUT /api/surveys/{id}`
///
/// `isAnonymous` is frozen once the survey has responses.
pub async fn update<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
  payload: Result<Json<UpdateSurvey>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  let id = parse_id(&id)?;
  let Json(body) = payload?;

  let patch = SurveyPatch {
    title:        body.title.map(|t| t.trim().to_owned()),
    description:  body.description,
    is_anonymous: body.is_anonymous,
    questions:    body.questions.as_ref().map(QuestionSchema::parse).transpose()?,
    ..Default::default()
  };
  patch.validate()?;

  let current = load_survey(&state, id).await?;
  if let Some(anonymous) = patch.is_anonymous
    && anonymous != current.is_anonymous
  {
    let collected = state
      .store
      .count_responses(id, DateRange::default())
      .await
      .map_err(ApiError::store)?;
    if collected > 0 {
      return Err(ApiError::Conflict(
        "Anonymity cannot change once responses have been collected".to_owned(),
      ));
    }
  }

  apply(&state, id, patch).await
}

/// `DELETE /api/surveys/{id}`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  let id = parse_id(&id)?;

  if !state.store.delete_survey(id).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound(NOT_FOUND.to_owned()));
  }
  tracing::info!(survey_id = %id, deleted_by = %actor.username, "survey deleted");
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/surveys/{id}/publish`
pub async fn publish<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
  payload: Result<Json<Publish>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  let id = parse_id(&id)?;
  let Json(body) = payload?;

  let patch = SurveyPatch { is_published: Some(body.is_published), ..Default::default() };
  apply(&state, id, patch).await
}

/// `POST /api/surveys/{id}/complete`
pub async fn complete<S>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Path(id): Path<String>,
  payload: Result<Json<Complete>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  actor.require_staff()?;
  let id = parse_id(&id)?;
  let Json(body) = payload?;

  let patch = SurveyPatch { is_completed: Some(body.is_completed), ..Default::default() };
  apply(&state, id, patch).await
}

async fn apply<S>(
  state: &AppState<S>,
  id: uuid::Uuid,
  patch: SurveyPatch,
) -> Result<Json<Value>, ApiError>
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  let survey = state
    .store
    .update_survey(id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_owned()))?;
  Ok(Json(json!({ "survey": survey })))
}
