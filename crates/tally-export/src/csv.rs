//! Delimited-text export.
//!
//! Output opens with a UTF-8 byte-order mark so spreadsheet applications pick
//! the right encoding. Rows are CRLF-separated, without a trailing CRLF.

use crate::{ExportMeta, ResponseTable};

const BOM: char = '\u{FEFF}';

/// Render the metadata preamble, one blank row, then the response table.
pub fn render_csv(meta: &ExportMeta, table: &ResponseTable) -> String {
  let mut lines: Vec<String> = meta
    .rows()
    .iter()
    .map(|(label, value)| join_row([*label, value.as_str()]))
    .collect();

  lines.push(String::new());
  lines.push(join_row(table.header.iter().map(String::as_str)));
  lines.extend(
    table
      .rows
      .iter()
      .map(|row| join_row(row.iter().map(String::as_str))),
  );

  let mut out = String::from(BOM);
  out.push_str(&lines.join("\r\n"));
  out
}

fn join_row<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
  cells.into_iter().map(escape_cell).collect::<Vec<_>>().join(",")
}

/// Quote a cell iff it contains a delimiter, a quote or a line break.
fn escape_cell(cell: &str) -> String {
  if cell.contains([',', '"', '\r', '\n']) {
    format!("\"{}\"", cell.replace('"', "\"\""))
  } else {
    cell.to_owned()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::test_helpers::*;

  /// Minimal RFC 4180 reader: quoted fields, doubled quotes, CRLF records.
  fn parse(input: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
      match (quoted, c) {
        (true, '"') if chars.peek() == Some(&'"') => {
          chars.next();
          field.push('"');
        }
        (true, '"') => quoted = false,
        (true, c) => field.push(c),
        (false, '"') => quoted = true,
        (false, ',') => record.push(std::mem::take(&mut field)),
        (false, '\r') if chars.peek() == Some(&'\n') => {
          chars.next();
          record.push(std::mem::take(&mut field));
          records.push(std::mem::take(&mut record));
        }
        (false, c) => field.push(c),
      }
    }
    record.push(field);
    records.push(record);
    records
  }

  #[test]
  fn escapes_only_when_needed() {
    assert_eq!(escape_cell("plain"), "plain");
    assert_eq!(escape_cell("a,b"), "\"a,b\"");
    assert_eq!(escape_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
    assert_eq!(escape_cell("two\nlines"), "\"two\nlines\"");
    assert_eq!(escape_cell("cr\ronly"), "\"cr\ronly\"");
  }

  #[test]
  fn layout_has_bom_meta_blank_row_and_table() {
    let survey = survey();
    let table = ResponseTable::build(
      &survey.questions,
      &[response(&survey, 0, Some("alice"), json!({ "q1": 5 }))],
    );
    let csv = render_csv(&meta(&survey), &table);

    assert!(csv.starts_with('\u{FEFF}'));
    assert!(!csv.ends_with("\r\n"));

    let body = csv.trim_start_matches('\u{FEFF}');
    let lines: Vec<&str> = body.split("\r\n").collect();
    assert_eq!(lines[0], "Survey Title,Course feedback");
    assert_eq!(lines[3], "Start Date,2024-05-01");
    assert_eq!(lines[4], "Generated At,2024-06-01T08:30:00.000Z");
    assert_eq!(lines[5], "");
    assert_eq!(lines[6], "id,createdAt,userId,q1,q2");
    assert!(lines[7].ends_with(",alice,5,"));
    assert_eq!(lines.len(), 8);
  }

  #[test]
  fn output_parses_back_to_the_same_table() {
    let survey = survey();
    let responses = vec![
      response(&survey, 0, None, json!({ "q1": 3, "q2": "good, but long" })),
      response(&survey, 1, None, json!({ "q1": "4", "q2": "she said \"wow\"\r\nthen left" })),
      response(&survey, 2, None, json!({ "q2": ["a", "b"] })),
    ];
    let table = ResponseTable::build(&survey.questions, &responses);
    let csv = render_csv(&meta(&survey), &table);

    let records = parse(csv.trim_start_matches('\u{FEFF}'));
    let header_at = records
      .iter()
      .position(|r| r.first().map(String::as_str) == Some("id"))
      .unwrap();
    assert_eq!(records[header_at], table.header);
    assert_eq!(&records[header_at + 1..], &table.rows[..]);
    assert_eq!(records[header_at + 1][4], "good, but long");
    assert_eq!(records[header_at + 2][4], "she said \"wow\"\r\nthen left");
    assert_eq!(records[header_at + 3][4], r#"["a","b"]"#);
  }
}
