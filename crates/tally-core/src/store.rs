//! The `SurveyStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  range::DateRange,
  response::{Answers, NewResponse, Response},
  survey::{NewSurvey, Survey, SurveyPatch},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Sort direction on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
  #[default]
  Oldest,
  Newest,
}

/// Parameters for [`SurveyStore::find_responses`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseQuery {
  pub range: DateRange,
  pub order: Order,
}

/// Outcome of [`SurveyStore::submit_response`].
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
  Created(Response),
  /// The respondent already has a response for this survey.
  AlreadySubmitted,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a survey/response store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait SurveyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Surveys ───────────────────────────────────────────────────────────

  /// Persist a new, unpublished survey. Id and `created_at` are assigned by
  /// the store.
  fn create_survey(
    &self,
    input: NewSurvey,
  ) -> impl Future<Output = Result<Survey, Self::Error>> + Send + '_;

  /// Retrieve a survey by id. Returns `None` if not found.
  fn get_survey(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Survey>, Self::Error>> + Send + '_;

  /// List surveys, newest first.
  fn list_surveys(
    &self,
    published_only: bool,
  ) -> impl Future<Output = Result<Vec<Survey>, Self::Error>> + Send + '_;

  /// Apply `patch` and return the updated survey, or `None` if not found.
  fn update_survey(
    &self,
    id: Uuid,
    patch: SurveyPatch,
  ) -> impl Future<Output = Result<Option<Survey>, Self::Error>> + Send + '_;

  /// Delete a survey together with its responses. Returns `false` if the
  /// survey did not exist.
  fn delete_survey(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Responses ─────────────────────────────────────────────────────────

  /// Record a response. At most one response per `(survey, user_id)` exists
  /// when `user_id` is set; a second one yields
  /// [`SubmitOutcome::AlreadySubmitted`].
  fn submit_response(
    &self,
    input: NewResponse,
  ) -> impl Future<Output = Result<SubmitOutcome, Self::Error>> + Send + '_;

  /// The response `user_id` gave to `survey_id`, if any.
  fn find_respondent_response<'a>(
    &'a self,
    survey_id: Uuid,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<Response>, Self::Error>> + Send + 'a;

  /// Replace the answers of an existing response in place.
  fn update_response_answers(
    &self,
    response_id: Uuid,
    data: Answers,
  ) -> impl Future<Output = Result<Option<Response>, Self::Error>> + Send + '_;

  /// All responses of a survey matching `query`.
  fn find_responses(
    &self,
    survey_id: Uuid,
    query: ResponseQuery,
  ) -> impl Future<Output = Result<Vec<Response>, Self::Error>> + Send + '_;

  /// Number of responses of a survey within `range`.
  fn count_responses(
    &self,
    survey_id: Uuid,
    range: DateRange,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
