//! Per-question aggregation of response records.
//!
//! Only likert questions are summarised. Invalid answers (non-numeric, out of
//! range, fractional) are skipped for their question alone; they never fail the
//! report and never affect other questions.

use serde::{
  Serialize, Serializer,
  ser::SerializeMap,
};

use crate::{response::Response, survey::QuestionSchema};

// ─── Histogram ───────────────────────────────────────────────────────────────

/// Counts per likert value `1..=scale`. Every bucket is present, including
/// zero buckets. Serialises as `{"1": n, "2": n, ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram(Vec<u64>);

impl Histogram {
  pub fn new(scale: u8) -> Self { Self(vec![0; usize::from(scale)]) }

  fn record(&mut self, value: u8) {
    if let Some(slot) = self.0.get_mut(usize::from(value).wrapping_sub(1)) {
      *slot += 1;
    }
  }

  /// Count for `value`, 0 when outside the scale.
  pub fn count(&self, value: u8) -> u64 {
    self.0.get(usize::from(value).wrapping_sub(1)).copied().unwrap_or(0)
  }

  /// `(value, count)` pairs in ascending value order.
  pub fn iter(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
    self.0.iter().enumerate().map(|(i, c)| (i as u8 + 1, *c))
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Number of answers counted.
  pub fn total(&self) -> u64 { self.0.iter().sum() }

  /// Arithmetic mean of the counted values; exactly 0 when nothing was counted.
  pub fn mean(&self) -> f64 {
    let n = self.total();
    if n == 0 {
      return 0.0;
    }
    let sum: u64 = self.iter().map(|(v, c)| u64::from(v) * c).sum();
    sum as f64 / n as f64
  }

  /// Compact `value: count` rendering used by the document export.
  pub fn compact(&self, separator: &str) -> String {
    self
      .iter()
      .map(|(v, c)| format!("{v}: {c}"))
      .collect::<Vec<_>>()
      .join(separator)
  }
}

impl Serialize for Histogram {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.len()))?;
    for (value, count) in self.iter() {
      map.serialize_entry(&value.to_string(), &count)?;
    }
    map.end()
  }
}

// ─── Summaries ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikertSummary {
  pub label:  String,
  pub scale:  u8,
  pub avg:    f64,
  pub counts: Histogram,
}

/// Likert summaries keyed by question key, kept in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LikertSummaries(Vec<(String, LikertSummary)>);

impl LikertSummaries {
  pub fn get(&self, key: &str) -> Option<&LikertSummary> {
    self.0.iter().find(|(k, _)| k == key).map(|(_, s)| s)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &LikertSummary)> {
    self.0.iter().map(|(k, s)| (k.as_str(), s))
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl Serialize for LikertSummaries {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.len()))?;
    for (key, summary) in &self.0 {
      map.serialize_entry(key, summary)?;
    }
    map.end()
  }
}

/// The analytics payload: `{ totalResponses, likert: { [key]: summary } }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyAnalytics {
  pub total_responses: u64,
  pub likert:          LikertSummaries,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Aggregate `responses` against `schema`.
///
/// `responses` is expected to be already filtered to the requested date range;
/// `total_responses` is simply its length.
pub fn summarize(schema: &QuestionSchema, responses: &[Response]) -> SurveyAnalytics {
  let likert = schema
    .likert_questions()
    .map(|(question, scale)| {
      let mut counts = Histogram::new(scale);
      responses
        .iter()
        .filter_map(|r| r.data.get(&question.key))
        .filter_map(|answer| answer.as_likert(scale))
        .for_each(|v| counts.record(v));

      let summary = LikertSummary {
        label: question.label.clone(),
        scale,
        avg: counts.mean(),
        counts,
      };
      (question.key.clone(), summary)
    })
    .collect();

  SurveyAnalytics {
    total_responses: responses.len() as u64,
    likert:          LikertSummaries(likert),
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::response::Answers;

  fn response(data: serde_json::Value) -> Response {
    Response {
      id:         Uuid::new_v4(),
      survey_id:  Uuid::nil(),
      user_id:    None,
      data:       serde_json::from_value::<Answers>(data).unwrap(),
      created_at: Utc::now(),
      updated_at: None,
    }
  }

  fn schema(value: serde_json::Value) -> QuestionSchema { QuestionSchema::normalize(&value) }

  #[test]
  fn invalid_answers_are_skipped_not_fatal() {
    let schema = schema(json!({
      "items": [{ "key": "q1", "label": "Satisfaction", "type": "likert", "scale": 5 }]
    }));
    let responses = vec![
      response(json!({ "q1": 4 })),
      response(json!({ "q1": 2 })),
      response(json!({ "q1": "not-a-number" })),
    ];

    let report = summarize(&schema, &responses);
    assert_eq!(report.total_responses, 3);

    let q1 = report.likert.get("q1").unwrap();
    assert_eq!(q1.label, "Satisfaction");
    assert_eq!(q1.scale, 5);
    assert_eq!(q1.avg, 3.0);
    assert_eq!(
      serde_json::to_value(&q1.counts).unwrap(),
      json!({ "1": 0, "2": 1, "3": 0, "4": 1, "5": 0 })
    );
  }

  #[test]
  fn empty_histogram_has_every_bucket_and_zero_average() {
    let schema = schema(json!({ "items": [{ "key": "q", "type": "likert", "scale": 7 }] }));
    let report = summarize(&schema, &[response(json!({ "q": 99 })), response(json!({}))]);

    let q = report.likert.get("q").unwrap();
    assert_eq!(q.counts.len(), 7);
    assert_eq!(q.counts.total(), 0);
    assert_eq!(q.avg, 0.0);
    assert_eq!(report.total_responses, 2);
  }

  #[test]
  fn average_matches_weighted_counts() {
    let schema = schema(json!({ "items": [{ "key": "q", "type": "likert", "scale": 3 }] }));
    let answers = [1, 3, 3, 2, 3];
    let responses: Vec<_> = answers.iter().map(|a| response(json!({ "q": a }))).collect();

    let q = summarize(&schema, &responses).likert.get("q").cloned().unwrap();
    let weighted: u64 = q.counts.iter().map(|(v, c)| u64::from(v) * c).sum();
    assert_eq!(q.avg, weighted as f64 / q.counts.total() as f64);
    assert_eq!(q.avg, 12.0 / 5.0);
    assert!(q.counts.total() <= responses.len() as u64);
  }

  #[test]
  fn text_questions_are_not_aggregated_and_order_is_schema_order() {
    let schema = schema(json!({
      "sections": [
        { "items": [{ "key": "z", "type": "likert" }, { "key": "comment", "type": "text" }] },
        { "items": [{ "key": "a", "type": "likert", "scale": 4 }] },
      ]
    }));
    let report = summarize(&schema, &[response(json!({ "z": "5", "comment": "3", "a": 4.0 }))]);

    let keys: Vec<_> = report.likert.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["z", "a"]);
    assert_eq!(report.likert.get("z").unwrap().counts.count(5), 1);
    assert!(report.likert.get("comment").is_none());

    let body = serde_json::to_string(&report).unwrap();
    assert!(body.starts_with(r#"{"totalResponses":1,"likert":{"z":"#), "{body}");
  }

  #[test]
  fn compact_rendering() {
    let mut h = Histogram::new(3);
    h.record(2);
    h.record(2);
    assert_eq!(h.compact("  "), "1: 0  2: 2  3: 0");
  }
}
