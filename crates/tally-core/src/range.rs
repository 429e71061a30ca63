//! Inclusive creation-time filter applied to response queries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{Error, Result};

/// Optional inclusive `[start, end]` bounds on a response's `created_at`.
///
/// Both bounds are independent; either may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
  pub start: Option<DateTime<Utc>>,
  pub end:   Option<DateTime<Utc>>,
}

impl DateRange {
  /// Parse the raw `startDate` / `endDate` query strings.
  ///
  /// Empty strings are treated as absent. Any other unparsable bound rejects
  /// the whole range.
  pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
    Ok(Self {
      start: parse_bound("startDate", start)?,
      end:   parse_bound("endDate", end)?,
    })
  }

  pub fn is_unbounded(&self) -> bool { self.start.is_none() && self.end.is_none() }

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
  }
}

fn parse_bound(bound: &'static str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  let Some(raw) = raw.filter(|s| !s.is_empty()) else {
    return Ok(None);
  };
  parse_timestamp(raw)
    .map(Some)
    .ok_or_else(|| Error::InvalidDate { bound, value: raw.to_owned() })
}

/// Accepts RFC 3339, a zone-less date-time (read as UTC), or a bare date
/// (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn absent_and_empty_bounds_are_open() {
    let range = DateRange::parse(None, Some("")).unwrap();
    assert!(range.is_unbounded());
    assert!(range.contains(Utc::now()));
  }

  #[test]
  fn invalid_bound_is_rejected() {
    let err = DateRange::parse(Some("not-a-date"), None).unwrap_err();
    assert!(matches!(err, Error::InvalidDate { bound: "startDate", .. }));

    let err = DateRange::parse(Some("2024-01-01"), Some("2024-13-40")).unwrap_err();
    assert!(matches!(err, Error::InvalidDate { bound: "endDate", .. }));
  }

  #[test]
  fn whitespace_bound_is_rejected() {
    let err = DateRange::parse(Some(" "), None).unwrap_err();
    assert!(matches!(err, Error::InvalidDate { bound: "startDate", .. }));

    let err = DateRange::parse(None, Some(" 2024-03-01 ")).unwrap_err();
    assert!(matches!(err, Error::InvalidDate { bound: "endDate", .. }));
  }

  #[test]
  fn accepted_formats() {
    let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    for raw in [
      "2024-03-01",
      "2024-03-01T00:00",
      "2024-03-01T00:00:00",
      "2024-03-01T00:00:00.000Z",
      "2024-03-01T01:00:00+01:00",
    ] {
      assert_eq!(parse_timestamp(raw), Some(expected), "{raw}");
    }
  }

  #[test]
  fn bounds_are_inclusive() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
    let range = DateRange { start: Some(start), end: Some(end) };

    assert!(range.contains(start));
    assert!(range.contains(end));
    assert!(!range.contains(start - chrono::Duration::milliseconds(1)));
    assert!(!range.contains(end + chrono::Duration::milliseconds(1)));
  }
}
