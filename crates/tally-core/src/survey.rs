//! Surveys and their question schemas.
//!
//! A question schema arrives in one of two shapes, `{ "sections": [...] }` or
//! the flat legacy `{ "items": [...] }`, and is normalised once, on ingestion,
//! into an ordered list of [`Section`]s. Everything downstream (aggregation,
//! exports, required-answer checks) walks the canonical form only.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result, response::Answers};

/// Likert scale used when a question does not carry a usable one.
pub const DEFAULT_SCALE: u8 = 5;

/// Bounds accepted when a schema is validated on create/update.
pub const MIN_SCALE: u8 = 3;
pub const MAX_SCALE: u8 = 7;

// ─── Questions ───────────────────────────────────────────────────────────────

/// The answer domain of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuestionKind {
  /// Integer rating in `1..=scale`.
  Likert { scale: u8 },
  /// Free-form answer; only ever exported raw.
  Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
  /// Stable identifier; indexes the answer map of every response.
  pub key:      String,
  pub label:    String,
  #[serde(flatten)]
  pub kind:     QuestionKind,
  #[serde(default)]
  pub required: bool,
}

impl Question {
  /// The scale of a likert question, `None` for anything else.
  pub fn scale(&self) -> Option<u8> {
    match self.kind {
      QuestionKind::Likert { scale } => Some(scale),
      QuestionKind::Text => None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  pub items: Vec<Question>,
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Canonical question schema: ordered sections of ordered questions.
///
/// Deserialising goes through [`QuestionSchema::normalize`], so stored or
/// legacy schemas never fail to load; malformed items are simply dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct QuestionSchema {
  pub sections: Vec<Section>,
}

impl From<Value> for QuestionSchema {
  fn from(value: Value) -> Self { Self::normalize(&value) }
}

impl QuestionSchema {
  /// All questions in schema order: sections in order, then items in order.
  pub fn questions(&self) -> impl Iterator<Item = &Question> {
    self.sections.iter().flat_map(|s| s.items.iter())
  }

  /// Question keys in schema order.
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.questions().map(|q| q.key.as_str())
  }

  /// Likert questions in schema order, paired with their scale.
  pub fn likert_questions(&self) -> impl Iterator<Item = (&Question, u8)> {
    self.questions().filter_map(|q| q.scale().map(|s| (q, s)))
  }

  /// Lenient normalisation used when reading schemas back.
  ///
  /// - items without a non-empty string `key` are skipped,
  /// - a repeated key keeps its first occurrence,
  /// - a missing or unknown `type` is read as text,
  /// - a likert `scale` that is missing, non-numeric or not positive falls back
  ///   to [`DEFAULT_SCALE`].
  pub fn normalize(value: &Value) -> Self {
    let mut seen = HashSet::new();
    let sections = raw_sections(value)
      .unwrap_or_default()
      .into_iter()
      .map(|(title, items)| Section {
        title,
        items: items
          .iter()
          .filter_map(lenient_question)
          .filter(|q| seen.insert(q.key.clone()))
          .collect(),
      })
      .collect();
    Self { sections }
  }

  /// Strict parsing used when a schema is created or replaced through the API.
  pub fn parse(value: &Value) -> Result<Self> {
    let raw = raw_sections(value).ok_or(Error::MalformedSchema)?;

    let mut seen = HashSet::new();
    let mut index = 0usize;
    let mut sections = Vec::with_capacity(raw.len());

    for (title, items) in raw {
      let mut questions = Vec::with_capacity(items.len());
      for item in items {
        index += 1;
        let q = strict_question(item, index)?;
        if !seen.insert(q.key.clone()) {
          return Err(Error::DuplicateQuestionKey(q.key));
        }
        questions.push(q);
      }
      sections.push(Section { title, items: questions });
    }

    Ok(Self { sections })
  }

  /// Verify that every required question has a non-blank answer.
  pub fn check_required(&self, answers: &Answers) -> Result<()> {
    for q in self.questions().filter(|q| q.required) {
      match answers.get(&q.key) {
        Some(a) if !a.is_blank() => {}
        _ => return Err(Error::MissingAnswer(q.key.clone())),
      }
    }
    Ok(())
  }
}

/// Pull `(title, items)` pairs out of either schema shape. Sections without
/// an `items` array contribute nothing.
fn raw_sections(value: &Value) -> Option<Vec<(Option<String>, &[Value])>> {
  if let Some(sections) = value.get("sections").and_then(Value::as_array) {
    let out = sections
      .iter()
      .filter_map(|section| {
        let items = section.get("items").and_then(Value::as_array)?;
        let title = section
          .get("title")
          .and_then(Value::as_str)
          .map(str::to_owned);
        Some((title, items.as_slice()))
      })
      .collect();
    return Some(out);
  }

  value
    .get("items")
    .and_then(Value::as_array)
    .map(|items| vec![(None, items.as_slice())])
}

fn item_key(item: &Value) -> Option<&str> {
  item
    .get("key")
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|k| !k.is_empty())
}

fn item_label(item: &Value, key: &str) -> String {
  item
    .get("label")
    .and_then(Value::as_str)
    .unwrap_or(key)
    .to_owned()
}

fn item_type(item: &Value) -> Option<String> {
  item.get("type").and_then(Value::as_str).map(str::to_lowercase)
}

fn item_required(item: &Value) -> bool {
  item.get("required").and_then(Value::as_bool).unwrap_or(false)
}

/// Read a scale the way stored schemas may carry it: a number or a numeric
/// string. Returns `None` when absent or unusable.
fn raw_scale(item: &Value) -> Option<f64> {
  let scale = match item.get("scale")? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  };
  scale.filter(|n| n.is_finite())
}

fn lenient_scale(item: &Value) -> u8 {
  raw_scale(item)
    .map(f64::trunc)
    .filter(|s| *s >= 1.0 && *s <= f64::from(u8::MAX))
    .map_or(DEFAULT_SCALE, |s| s as u8)
}

fn lenient_question(item: &Value) -> Option<Question> {
  let key = item_key(item)?;
  let kind = match item_type(item).as_deref() {
    Some("likert") => QuestionKind::Likert { scale: lenient_scale(item) },
    _ => QuestionKind::Text,
  };
  Some(Question {
    key: key.to_owned(),
    label: item_label(item, key),
    kind,
    required: item_required(item),
  })
}

fn strict_question(item: &Value, index: usize) -> Result<Question> {
  let key = item_key(item).ok_or(Error::MissingQuestionKey(index))?;

  let kind = match item_type(item).as_deref() {
    Some("likert") => {
      let scale = match item.get("scale") {
        None | Some(Value::Null) => DEFAULT_SCALE,
        Some(_) => {
          let raw = raw_scale(item).unwrap_or(f64::NAN);
          let in_range = raw.fract() == 0.0
            && raw >= f64::from(MIN_SCALE)
            && raw <= f64::from(MAX_SCALE);
          if !in_range {
            return Err(Error::InvalidScale {
              key:   key.to_owned(),
              scale: if raw.is_finite() { raw as i64 } else { 0 },
            });
          }
          raw as u8
        }
      };
      QuestionKind::Likert { scale }
    }
    Some("text") => QuestionKind::Text,
    other => {
      return Err(Error::UnsupportedQuestionType {
        key:  key.to_owned(),
        kind: other.unwrap_or_default().to_owned(),
      });
    }
  };

  Ok(Question {
    key: key.to_owned(),
    label: item_label(item, key),
    kind,
    required: item_required(item),
  })
}

// ─── Survey ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
  pub id:           Uuid,
  pub title:        String,
  pub description:  Option<String>,
  /// Responses to an anonymous survey never carry a respondent identity.
  pub is_anonymous: bool,
  pub is_published: bool,
  pub is_completed: bool,
  /// Username of the account that created the survey.
  pub created_by:   String,
  pub questions:    QuestionSchema,
  pub created_at:   DateTime<Utc>,
}

impl Survey {
  /// Published and not yet closed.
  pub fn accepts_submissions(&self) -> bool {
    self.is_published && !self.is_completed
  }

  /// Apply a partial update in place.
  pub fn apply(&mut self, patch: SurveyPatch) {
    if let Some(title) = patch.title {
      self.title = title;
    }
    if let Some(description) = patch.description {
      self.description = description;
    }
    if let Some(anon) = patch.is_anonymous {
      self.is_anonymous = anon;
    }
    if let Some(questions) = patch.questions {
      self.questions = questions;
    }
    if let Some(published) = patch.is_published {
      self.is_published = published;
    }
    if let Some(completed) = patch.is_completed {
      self.is_completed = completed;
    }
  }
}

/// Input to [`crate::store::SurveyStore::create_survey`].
#[derive(Debug, Clone)]
pub struct NewSurvey {
  pub title:        String,
  pub description:  Option<String>,
  pub is_anonymous: bool,
  pub questions:    QuestionSchema,
  pub created_by:   String,
}

impl NewSurvey {
  pub fn validate(&self) -> Result<()> { validate_title(&self.title) }
}

/// A partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SurveyPatch {
  pub title:        Option<String>,
  /// `Some(None)` clears the description.
  pub description:  Option<Option<String>>,
  pub is_anonymous: Option<bool>,
  pub questions:    Option<QuestionSchema>,
  pub is_published: Option<bool>,
  pub is_completed: Option<bool>,
}

impl SurveyPatch {
  pub fn validate(&self) -> Result<()> {
    match &self.title {
      Some(t) => validate_title(t),
      None => Ok(()),
    }
  }
}

fn validate_title(title: &str) -> Result<()> {
  let len = title.trim().chars().count();
  if (3..=200).contains(&len) { Ok(()) } else { Err(Error::InvalidTitle) }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::response::AnswerValue;

  #[test]
  fn flat_items_become_a_single_section() {
    let schema = QuestionSchema::normalize(&json!({
      "items": [
        { "key": "q1", "label": "Satisfaction", "type": "likert", "scale": 5 },
        { "key": "q2", "label": "Comments", "type": "text" },
      ]
    }));
    assert_eq!(schema.sections.len(), 1);
    assert_eq!(schema.keys().collect::<Vec<_>>(), ["q1", "q2"]);
  }

  #[test]
  fn sections_flatten_in_order() {
    let schema = QuestionSchema::normalize(&json!({
      "sections": [
        { "title": "A", "items": [{ "key": "a1", "type": "text" }] },
        { "items": [{ "key": "b1", "type": "likert" }, { "key": "b2", "type": "text" }] },
      ]
    }));
    assert_eq!(schema.keys().collect::<Vec<_>>(), ["a1", "b1", "b2"]);
    assert_eq!(schema.sections[0].title.as_deref(), Some("A"));
  }

  #[test]
  fn lenient_skips_malformed_items() {
    let schema = QuestionSchema::normalize(&json!({
      "items": [
        { "label": "no key", "type": "likert" },
        { "key": "", "type": "likert" },
        { "key": "ok", "type": "LIKERT", "scale": "7" },
        { "key": "ok", "type": "text" },
        { "key": "untyped" },
        "not even an object",
      ]
    }));
    let questions: Vec<_> = schema.questions().collect();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].kind, QuestionKind::Likert { scale: 7 });
    assert_eq!(questions[1].kind, QuestionKind::Text);
    assert_eq!(questions[1].label, "untyped");
  }

  #[test]
  fn lenient_scale_defaults_to_five() {
    for scale in [json!(null), json!(0), json!(-3), json!("abc"), json!(true)] {
      let schema = QuestionSchema::normalize(&json!({
        "items": [{ "key": "q", "type": "likert", "scale": scale }]
      }));
      let (_, s) = schema.likert_questions().next().unwrap();
      assert_eq!(s, DEFAULT_SCALE, "scale input {scale}");
    }
  }

  #[test]
  fn unknown_shape_normalises_to_empty() {
    assert!(QuestionSchema::normalize(&json!({ "foo": 1 })).sections.is_empty());
    assert!(QuestionSchema::normalize(&json!([1, 2])).sections.is_empty());
  }

  #[test]
  fn strict_rejects_duplicates_and_bad_scales() {
    let dup = QuestionSchema::parse(&json!({
      "items": [{ "key": "q", "type": "text" }, { "key": "q", "type": "text" }]
    }));
    assert!(matches!(dup, Err(Error::DuplicateQuestionKey(k)) if k == "q"));

    let bad = QuestionSchema::parse(&json!({
      "items": [{ "key": "q", "type": "likert", "scale": 10 }]
    }));
    assert!(matches!(bad, Err(Error::InvalidScale { scale: 10, .. })));

    let missing = QuestionSchema::parse(&json!({ "items": [{ "type": "text" }] }));
    assert!(matches!(missing, Err(Error::MissingQuestionKey(1))));

    let kind = QuestionSchema::parse(&json!({ "items": [{ "key": "q", "type": "matrix" }] }));
    assert!(matches!(kind, Err(Error::UnsupportedQuestionType { .. })));

    assert!(matches!(
      QuestionSchema::parse(&json!({ "questions": [] })),
      Err(Error::MalformedSchema)
    ));
  }

  #[test]
  fn strict_accepts_both_shapes() {
    let schema = QuestionSchema::parse(&json!({
      "sections": [{ "items": [{ "key": "q", "type": "likert", "scale": 3, "required": true }] }]
    }))
    .unwrap();
    let q = schema.questions().next().unwrap();
    assert_eq!(q.scale(), Some(3));
    assert!(q.required);
    assert_eq!(q.label, "q");
  }

  #[test]
  fn canonical_form_round_trips() {
    let schema = QuestionSchema::parse(&json!({
      "items": [
        { "key": "q1", "label": "Rate", "type": "likert", "scale": 4 },
        { "key": "q2", "label": "Why", "type": "text", "required": true },
      ]
    }))
    .unwrap();
    let stored = serde_json::to_value(&schema).unwrap();
    assert!(stored.get("sections").is_some());
    assert_eq!(QuestionSchema::normalize(&stored), schema);
  }

  #[test]
  fn required_answers_are_enforced() {
    let schema = QuestionSchema::parse(&json!({
      "items": [{ "key": "q1", "type": "text", "required": true }, { "key": "q2", "type": "text" }]
    }))
    .unwrap();

    let mut answers = Answers::new();
    assert!(matches!(schema.check_required(&answers), Err(Error::MissingAnswer(k)) if k == "q1"));

    answers.insert("q1".into(), AnswerValue::Text("   ".into()));
    assert!(schema.check_required(&answers).is_err());

    answers.insert("q1".into(), AnswerValue::Text("ok".into()));
    assert!(schema.check_required(&answers).is_ok());
  }

  #[test]
  fn titles_are_length_checked() {
    let mut patch = SurveyPatch { title: Some("ab".into()), ..Default::default() };
    assert!(matches!(patch.validate(), Err(Error::InvalidTitle)));
    patch.title = Some("abc".into());
    assert!(patch.validate().is_ok());
  }
}
