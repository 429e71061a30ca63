//! Responses and their schemaless answer payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::survey::Survey;

// ─── Answers ─────────────────────────────────────────────────────────────────

/// A single answer as submitted. The answer map has no static schema, so every
/// JSON shape is representable; coercion into numbers happens explicitly in
/// [`AnswerValue::as_number`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
  Null,
  Bool(bool),
  Number(f64),
  Text(String),
  /// Arrays and objects, kept verbatim.
  Structured(Value),
}

impl From<Value> for AnswerValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Self::Null,
      Value::Bool(b) => Self::Bool(b),
      Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
      Value::String(s) => Self::Text(s),
      other => Self::Structured(other),
    }
  }
}

impl From<AnswerValue> for Value {
  fn from(value: AnswerValue) -> Self {
    match value {
      AnswerValue::Null => Value::Null,
      AnswerValue::Bool(b) => Value::Bool(b),
      AnswerValue::Number(n) => serde_json::Number::from_f64(n)
        .map_or(Value::Null, |num| {
          // Integral values go back out as JSON integers.
          if n.fract() == 0.0 && n.abs() < 9.0e15 {
            Value::from(n as i64)
          } else {
            Value::Number(num)
          }
        }),
      AnswerValue::Text(s) => Value::String(s),
      AnswerValue::Structured(v) => v,
    }
  }
}

impl Serialize for AnswerValue {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    Value::from(self.clone()).serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for AnswerValue {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Value::deserialize(deserializer).map(Self::from)
  }
}

impl AnswerValue {
  /// Numeric reading of the answer: numbers as-is, text when its trimmed
  /// content parses as a finite number. Everything else has no numeric value.
  pub fn as_number(&self) -> Option<f64> {
    let n = match self {
      Self::Number(n) => *n,
      Self::Text(s) => s.trim().parse::<f64>().ok()?,
      Self::Null | Self::Bool(_) | Self::Structured(_) => return None,
    };
    n.is_finite().then_some(n)
  }

  /// Likert reading: an integer in `1..=scale`, or `None`.
  pub fn as_likert(&self, scale: u8) -> Option<u8> {
    let n = self.as_number()?;
    (n.fract() == 0.0 && n >= 1.0 && n <= f64::from(scale)).then_some(n as u8)
  }

  /// Null, or text that is empty after trimming.
  pub fn is_blank(&self) -> bool {
    match self {
      Self::Null => true,
      Self::Text(s) => s.trim().is_empty(),
      _ => false,
    }
  }

  /// Spreadsheet cell rendering: structured values JSON-encoded, null empty,
  /// everything else stringified.
  pub fn to_cell(&self) -> String {
    match self {
      Self::Null => String::new(),
      Self::Bool(b) => b.to_string(),
      Self::Number(n) => n.to_string(),
      Self::Text(s) => s.clone(),
      Self::Structured(v) => v.to_string(),
    }
  }
}

/// Answer map keyed by question key.
pub type Answers = BTreeMap<String, AnswerValue>;

// ─── Response ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
  pub id:         Uuid,
  pub survey_id:  Uuid,
  /// `None` for anonymous surveys.
  pub user_id:    Option<String>,
  pub data:       Answers,
  /// Server-assigned; never changes, also not on in-place edits.
  pub created_at: DateTime<Utc>,
  pub updated_at: Option<DateTime<Utc>>,
}

/// Input to [`crate::store::SurveyStore::submit_response`].
#[derive(Debug, Clone)]
pub struct NewResponse {
  pub survey_id: Uuid,
  pub user_id:   Option<String>,
  pub data:      Answers,
}

impl NewResponse {
  /// Build a submission for `survey`, dropping the respondent identity when the
  /// survey is anonymous.
  pub fn for_survey(survey: &Survey, respondent: Option<&str>, data: Answers) -> Self {
    Self {
      survey_id: survey.id,
      user_id:   respondent
        .filter(|_| !survey.is_anonymous)
        .map(str::to_owned),
      data,
    }
  }
}
