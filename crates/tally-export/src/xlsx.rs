//! Office Open XML workbook export.
//!
//! Writes the smallest package spreadsheet applications accept: content types,
//! package and workbook relationships, a workbook and two worksheets. Every
//! cell is an inline string, so no shared-strings part is needed.

use std::io::{Cursor, Write as _};

use quick_xml::{
  Writer,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::{ExportMeta, ResponseTable, error::{Error, Result}};

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Meta" sheetId="1" r:id="rId1"/><sheet name="Responses" sheetId="2" r:id="rId2"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/></Relationships>"#;

/// Render a two-sheet workbook: `Meta` (field/value pairs) and `Responses`.
pub fn render_xlsx(meta: &ExportMeta, table: &ResponseTable) -> Result<Vec<u8>> {
  let mut meta_rows = vec![vec!["Field".to_owned(), "Value".to_owned()]];
  meta_rows.extend(
    meta
      .rows()
      .into_iter()
      .map(|(label, value)| vec![label.to_owned(), value]),
  );
  let meta_sheet = SheetBuilder::new(&[20.0, 50.0])?.rows(&meta_rows)?.finish()?;

  let widths = vec![20.0; table.header.len()];
  let responses_sheet = SheetBuilder::new(&widths)?
    .rows(std::slice::from_ref(&table.header))?
    .rows(&table.rows)?
    .finish()?;

  let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
  let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

  let parts: [(&str, &[u8]); 6] = [
    ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
    ("_rels/.rels", PACKAGE_RELS.as_bytes()),
    ("xl/workbook.xml", WORKBOOK.as_bytes()),
    ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
    ("xl/worksheets/sheet1.xml", &meta_sheet),
    ("xl/worksheets/sheet2.xml", &responses_sheet),
  ];
  for (name, bytes) in parts {
    zip.start_file(name, options)?;
    zip.write_all(bytes)?;
  }

  Ok(zip.finish()?.into_inner())
}

// ─── Worksheet writer ────────────────────────────────────────────────────────

struct SheetBuilder {
  writer:   Writer<Cursor<Vec<u8>>>,
  next_row: usize,
}

impl SheetBuilder {
  /// Open a worksheet with one `<col>` width per column.
  fn new(widths: &[f64]) -> Result<Self> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("worksheet");
    root.push_attribute(("xmlns", NS_MAIN));
    write(&mut writer, Event::Start(root))?;

    if !widths.is_empty() {
      write(&mut writer, Event::Start(BytesStart::new("cols")))?;
      for (i, width) in widths.iter().enumerate() {
        let n = (i + 1).to_string();
        let width = width.to_string();
        let mut col = BytesStart::new("col");
        col.push_attribute(("min", n.as_str()));
        col.push_attribute(("max", n.as_str()));
        col.push_attribute(("width", width.as_str()));
        col.push_attribute(("customWidth", "1"));
        write(&mut writer, Event::Empty(col))?;
      }
      write(&mut writer, Event::End(BytesEnd::new("cols")))?;
    }

    write(&mut writer, Event::Start(BytesStart::new("sheetData")))?;
    Ok(Self { writer, next_row: 1 })
  }

  fn rows(mut self, rows: &[Vec<String>]) -> Result<Self> {
    for row in rows {
      self.row(row)?;
    }
    Ok(self)
  }

  fn row(&mut self, cells: &[String]) -> Result<()> {
    let r = self.next_row.to_string();
    let w = &mut self.writer;

    let mut row = BytesStart::new("row");
    row.push_attribute(("r", r.as_str()));
    write(w, Event::Start(row))?;

    for (col, value) in cells.iter().enumerate() {
      let reference = format!("{}{}", column_name(col), self.next_row);
      let mut c = BytesStart::new("c");
      c.push_attribute(("r", reference.as_str()));
      c.push_attribute(("t", "inlineStr"));
      write(w, Event::Start(c))?;
      write(w, Event::Start(BytesStart::new("is")))?;

      let mut t = BytesStart::new("t");
      t.push_attribute(("xml:space", "preserve"));
      write(w, Event::Start(t))?;
      let text = xml_safe(value);
      write(w, Event::Text(BytesText::new(&text)))?;
      write(w, Event::End(BytesEnd::new("t")))?;

      write(w, Event::End(BytesEnd::new("is")))?;
      write(w, Event::End(BytesEnd::new("c")))?;
    }

    write(w, Event::End(BytesEnd::new("row")))?;
    self.next_row += 1;
    Ok(())
  }

  fn finish(mut self) -> Result<Vec<u8>> {
    write(&mut self.writer, Event::End(BytesEnd::new("sheetData")))?;
    write(&mut self.writer, Event::End(BytesEnd::new("worksheet")))?;
    Ok(self.writer.into_inner().into_inner())
  }
}

fn write(w: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
  w.write_event(event).map_err(|e| Error::Xml(e.to_string()))
}

/// Spreadsheet column letters: 0 → `A`, 25 → `Z`, 26 → `AA`.
fn column_name(index: usize) -> String {
  let mut n = index + 1;
  let mut name = Vec::new();
  while n > 0 {
    let rem = (n - 1) % 26;
    name.push(b'A' + rem as u8);
    n = (n - 1) / 26;
  }
  name.reverse();
  String::from_utf8_lossy(&name).into_owned()
}

/// Drop characters XML 1.0 cannot carry.
fn xml_safe(s: &str) -> String {
  s.chars()
    .filter(|c| matches!(c, '\t' | '\n' | '\r') || *c >= ' ')
    .collect()
}

#[cfg(test)]
mod tests {
  use std::io::Read as _;

  use serde_json::json;
  use zip::ZipArchive;

  use super::*;
  use crate::test_helpers::*;

  fn read_part(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut xml = String::new();
    archive
      .by_name(name)
      .expect("part present")
      .read_to_string(&mut xml)
      .expect("utf-8 part");
    xml
  }

  #[test]
  fn column_names_roll_over() {
    assert_eq!(column_name(0), "A");
    assert_eq!(column_name(25), "Z");
    assert_eq!(column_name(26), "AA");
    assert_eq!(column_name(27), "AB");
    assert_eq!(column_name(701), "ZZ");
    assert_eq!(column_name(702), "AAA");
  }

  #[test]
  fn workbook_has_both_sheets() {
    let survey = survey();
    let table = ResponseTable::build(
      &survey.questions,
      &[response(&survey, 0, Some("alice"), json!({ "q1": 4, "q2": "a < b & c" }))],
    );
    let bytes = render_xlsx(&meta(&survey), &table).unwrap();

    let archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(
      names,
      [
        "[Content_Types].xml",
        "_rels/.rels",
        "xl/_rels/workbook.xml.rels",
        "xl/workbook.xml",
        "xl/worksheets/sheet1.xml",
        "xl/worksheets/sheet2.xml",
      ]
    );

    let workbook = read_part(&bytes, "xl/workbook.xml");
    assert!(workbook.contains(r#"name="Meta""#));
    assert!(workbook.contains(r#"name="Responses""#));
  }

  #[test]
  fn meta_sheet_lists_field_value_pairs() {
    let survey = survey();
    let table = ResponseTable::build(&survey.questions, &[]);
    let bytes = render_xlsx(&meta(&survey), &table).unwrap();

    let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(r#"<c r="A1" t="inlineStr"><is><t xml:space="preserve">Field</t></is></c>"#));
    assert!(sheet.contains(r#"<c r="B2" t="inlineStr"><is><t xml:space="preserve">Course feedback</t></is></c>"#));
    assert!(sheet.contains("Start Date"));
    assert!(sheet.contains("2024-06-01T08:30:00.000Z"));
    assert!(!sheet.contains("End Date"));
  }

  #[test]
  fn responses_sheet_escapes_cell_text() {
    let survey = survey();
    let table = ResponseTable::build(
      &survey.questions,
      &[response(&survey, 0, Some("alice"), json!({ "q1": 4, "q2": "a < b & c\u{1}" }))],
    );
    let bytes = render_xlsx(&meta(&survey), &table).unwrap();

    let sheet = read_part(&bytes, "xl/worksheets/sheet2.xml");
    assert!(sheet.contains(r#"<row r="1">"#));
    assert!(sheet.contains(r#"<row r="2">"#));
    assert!(!sheet.contains(r#"<row r="3">"#));
    assert!(sheet.contains(">createdAt<"));
    assert!(sheet.contains(">alice<"));
    assert!(sheet.contains("a &lt; b &amp; c<"));
  }
}
