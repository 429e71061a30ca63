//! Survey export renderers for Tally.
//!
//! Turns a survey's metadata and response records into downloadable files:
//! delimited text ([`render_csv`]), an Office Open XML workbook
//! ([`render_xlsx`]) and a paginated PDF summary ([`render_pdf`]). Pure
//! synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use chrono::Utc;
//! use tally_export::{ExportMeta, ResponseTable, render_csv};
//! # fn demo(survey: &tally_core::survey::Survey, responses: &[tally_core::response::Response]) {
//! let meta = ExportMeta::new(survey, None, None, Utc::now());
//! let table = ResponseTable::build(&survey.questions, responses);
//! let csv: String = render_csv(&meta, &table);
//! # }
//! ```

mod csv;
pub mod error;
mod pdf;
mod xlsx;

use chrono::{DateTime, SecondsFormat, Utc};
use tally_core::{response::Response, survey::{QuestionSchema, Survey}};
use uuid::Uuid;

pub use csv::render_csv;
pub use error::{Error, Result};
pub use pdf::render_pdf;
pub use xlsx::render_xlsx;

// ─── Metadata ────────────────────────────────────────────────────────────────

/// The preamble every export format opens with.
#[derive(Debug, Clone)]
pub struct ExportMeta {
  pub title:        String,
  pub survey_id:    Uuid,
  pub is_anonymous: bool,
  /// The `startDate` bound exactly as the caller supplied it.
  pub start_date:   Option<String>,
  /// The `endDate` bound exactly as the caller supplied it.
  pub end_date:     Option<String>,
  pub generated_at: DateTime<Utc>,
}

impl ExportMeta {
  /// Empty bound strings are treated as absent.
  pub fn new(
    survey: &Survey,
    start_date: Option<&str>,
    end_date: Option<&str>,
    generated_at: DateTime<Utc>,
  ) -> Self {
    let given = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_owned);
    Self {
      title: survey.title.clone(),
      survey_id: survey.id,
      is_anonymous: survey.is_anonymous,
      start_date: given(start_date),
      end_date: given(end_date),
      generated_at,
    }
  }

  /// `(label, value)` pairs in export order.
  pub fn rows(&self) -> Vec<(&'static str, String)> {
    let mut rows = vec![
      ("Survey Title", self.title.clone()),
      ("Survey ID", self.survey_id.to_string()),
      ("Anonymous", self.is_anonymous.to_string()),
    ];
    if let Some(start) = &self.start_date {
      rows.push(("Start Date", start.clone()));
    }
    if let Some(end) = &self.end_date {
      rows.push(("End Date", end.clone()));
    }
    rows.push(("Generated At", format_timestamp(self.generated_at)));
    rows
  }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ─── Response table ──────────────────────────────────────────────────────────

/// The raw response grid shared by the CSV and spreadsheet exports.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTable {
  /// `id, createdAt, userId`, then the question keys in schema order.
  pub header: Vec<String>,
  pub rows:   Vec<Vec<String>>,
}

impl ResponseTable {
  /// Lay out `responses` against `schema`, oldest response first.
  pub fn build(schema: &QuestionSchema, responses: &[Response]) -> Self {
    let keys: Vec<&str> = schema.keys().collect();

    let mut header = vec!["id".to_owned(), "createdAt".to_owned(), "userId".to_owned()];
    header.extend(keys.iter().map(|k| (*k).to_owned()));

    let mut ordered: Vec<&Response> = responses.iter().collect();
    ordered.sort_by_key(|r| r.created_at);

    let rows = ordered
      .into_iter()
      .map(|r| {
        let mut row = Vec::with_capacity(header.len());
        row.push(r.id.to_string());
        row.push(format_timestamp(r.created_at));
        row.push(r.user_id.clone().unwrap_or_default());
        row.extend(
          keys
            .iter()
            .map(|k| r.data.get(*k).map(|a| a.to_cell()).unwrap_or_default()),
        );
        row
      })
      .collect();

    Self { header, rows }
  }
}

// ─── Shared test helpers ─────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_helpers {
  use chrono::{Duration, TimeZone, Utc};
  use serde_json::json;
  use tally_core::{
    response::{Answers, Response},
    survey::{QuestionSchema, Survey},
  };
  use uuid::Uuid;

  use super::ExportMeta;

  pub(crate) fn survey() -> Survey {
    Survey {
      id:           Uuid::new_v4(),
      title:        "Course feedback".into(),
      description:  None,
      is_anonymous: false,
      is_published: true,
      is_completed: false,
      created_by:   "prof".into(),
      questions:    QuestionSchema::normalize(&json!({
        "sections": [
          { "title": "Ratings", "items": [
            { "key": "q1", "label": "Satisfaction", "type": "likert", "scale": 5 },
          ]},
          { "items": [{ "key": "q2", "label": "Comments", "type": "text" }] },
        ]
      })),
      created_at:   Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  /// A response created `minutes` after 2024-05-01T12:00Z.
  pub(crate) fn response(
    survey: &Survey,
    minutes: i64,
    user: Option<&str>,
    data: serde_json::Value,
  ) -> Response {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Response {
      id:         Uuid::new_v4(),
      survey_id:  survey.id,
      user_id:    user.map(str::to_owned),
      data:       serde_json::from_value::<Answers>(data).unwrap(),
      created_at: base + Duration::minutes(minutes),
      updated_at: None,
    }
  }

  pub(crate) fn meta(survey: &Survey) -> ExportMeta {
    ExportMeta::new(
      survey,
      Some("2024-05-01"),
      None,
      Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap(),
    )
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::{test_helpers::*, *};

  #[test]
  fn meta_rows_skip_absent_bounds() {
    let survey = survey();
    let meta = ExportMeta::new(&survey, Some(""), Some("2024-06-01"), chrono::Utc::now());
    let labels: Vec<_> = meta.rows().into_iter().map(|(l, _)| l).collect();
    assert_eq!(
      labels,
      ["Survey Title", "Survey ID", "Anonymous", "End Date", "Generated At"]
    );
  }

  #[test]
  fn generated_at_uses_millisecond_precision() {
    let survey = survey();
    let rows = meta(&survey).rows();
    let (_, generated) = rows.last().unwrap();
    assert_eq!(generated, "2024-06-01T08:30:00.000Z");
  }

  #[test]
  fn table_is_sorted_and_keyed_by_schema() {
    let survey = survey();
    let late = response(&survey, 10, Some("bob"), json!({ "q1": 2 }));
    let early = response(
      &survey,
      0,
      None,
      json!({ "q1": 4.0, "q2": { "nested": [1, 2] }, "ignored": "x" }),
    );

    let table = ResponseTable::build(&survey.questions, &[late.clone(), early.clone()]);
    assert_eq!(table.header, ["id", "createdAt", "userId", "q1", "q2"]);
    assert_eq!(table.rows.len(), 2);

    assert_eq!(table.rows[0][0], early.id.to_string());
    assert_eq!(table.rows[0][1], "2024-05-01T12:00:00.000Z");
    assert_eq!(table.rows[0][2], "");
    assert_eq!(table.rows[0][3], "4");
    assert_eq!(table.rows[0][4], r#"{"nested":[1,2]}"#);

    assert_eq!(table.rows[1][2], "bob");
    assert_eq!(table.rows[1][4], "");
  }
}
