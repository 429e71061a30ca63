//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that string comparison in SQL matches time order.
//! Question schemas and answer maps are stored as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use tally_core::{
  response::{Answers, Response},
  survey::{QuestionSchema, Survey},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The current time at storage precision, so values handed back from a write
/// compare equal to what a later read returns.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ─────────────────────────────────────────────────────────────

pub fn encode_questions(schema: &QuestionSchema) -> Result<String> {
  Ok(serde_json::to_string(schema)?)
}

/// Lenient: a stored schema never fails to load, malformed items are dropped.
pub fn decode_questions(s: &str) -> Result<QuestionSchema> {
  let value: serde_json::Value = serde_json::from_str(s)?;
  Ok(QuestionSchema::normalize(&value))
}

pub fn encode_answers(data: &Answers) -> Result<String> {
  Ok(serde_json::to_string(data)?)
}

pub fn decode_answers(s: &str) -> Result<Answers> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawSurvey`] field order.
pub const SURVEY_COLUMNS: &str = "survey_id, title, description, is_anonymous, \
   is_published, is_completed, created_by, questions_json, created_at";

/// Raw values read directly from a `surveys` row.
pub struct RawSurvey {
  pub survey_id:      String,
  pub title:          String,
  pub description:    Option<String>,
  pub is_anonymous:   bool,
  pub is_published:   bool,
  pub is_completed:   bool,
  pub created_by:     String,
  pub questions_json: String,
  pub created_at:     String,
}

impl RawSurvey {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      survey_id:      row.get(0)?,
      title:          row.get(1)?,
      description:    row.get(2)?,
      is_anonymous:   row.get(3)?,
      is_published:   row.get(4)?,
      is_completed:   row.get(5)?,
      created_by:     row.get(6)?,
      questions_json: row.get(7)?,
      created_at:     row.get(8)?,
    })
  }

  pub fn into_survey(self) -> Result<Survey> {
    Ok(Survey {
      id:           decode_uuid(&self.survey_id)?,
      title:        self.title,
      description:  self.description,
      is_anonymous: self.is_anonymous,
      is_published: self.is_published,
      is_completed: self.is_completed,
      created_by:   self.created_by,
      questions:    decode_questions(&self.questions_json)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Column list matching [`RawResponse`] field order.
pub const RESPONSE_COLUMNS: &str =
  "response_id, survey_id, user_id, answers_json, created_at, updated_at";

/// Raw strings read directly from a `responses` row.
pub struct RawResponse {
  pub response_id:  String,
  pub survey_id:    String,
  pub user_id:      Option<String>,
  pub answers_json: String,
  pub created_at:   String,
  pub updated_at:   Option<String>,
}

impl RawResponse {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      response_id:  row.get(0)?,
      survey_id:    row.get(1)?,
      user_id:      row.get(2)?,
      answers_json: row.get(3)?,
      created_at:   row.get(4)?,
      updated_at:   row.get(5)?,
    })
  }

  pub fn into_response(self) -> Result<Response> {
    Ok(Response {
      id:         decode_uuid(&self.response_id)?,
      survey_id:  decode_uuid(&self.survey_id)?,
      user_id:    self.user_id,
      data:       decode_answers(&self.answers_json)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: self.updated_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
