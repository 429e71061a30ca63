//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A `startDate` / `endDate` bound that does not parse as a timestamp.
  #[error("invalid {bound}: {value:?}")]
  InvalidDate { bound: &'static str, value: String },

  #[error("title must be between 3 and 200 characters")]
  InvalidTitle,

  #[error("question schema must contain `sections` or `items`")]
  MalformedSchema,

  #[error("question #{0} has no key")]
  MissingQuestionKey(usize),

  #[error("duplicate question key: {0}")]
  DuplicateQuestionKey(String),

  #[error("question {key}: unsupported type {kind:?}")]
  UnsupportedQuestionType { key: String, kind: String },

  #[error("question {key}: likert scale must be between 3 and 7, got {scale}")]
  InvalidScale { key: String, scale: i64 },

  #[error("Missing required answer: {0}")]
  MissingAnswer(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// True for errors caused by caller input rather than by the system.
  pub fn is_validation(&self) -> bool { !matches!(self, Self::Serialization(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
