//! PDF 1.4 summary report.
//!
//! A minimal writer over the two base-14 Helvetica faces, so no fonts are
//! embedded. Text is laid out top-down on US Letter pages with 50pt margins;
//! long lines are word-wrapped and content flows onto new pages.
//!
//! Widths are estimated from an average glyph advance rather than real font
//! metrics, which is enough to keep lines inside the margins.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tally_core::analytics::SurveyAnalytics;

use crate::{ExportMeta, format_timestamp};

const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const MARGIN: f64 = 50.0;
const LINE_SPACING: f64 = 1.2;
/// Average Helvetica advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f64 = 0.52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
  Regular,
  Bold,
}

impl Font {
  fn resource(self) -> &'static str {
    match self {
      Self::Regular => "F1",
      Self::Bold => "F2",
    }
  }
}

/// A positioned run of text on a page.
#[derive(Debug, Clone, PartialEq)]
struct Placed {
  font: Font,
  size: f64,
  x:    f64,
  y:    f64,
  text: String,
}

// ─── Layout ──────────────────────────────────────────────────────────────────

/// Top-down text flow with automatic page breaks.
struct Layout {
  pages: Vec<Vec<Placed>>,
  /// Baseline cursor measured from the bottom edge.
  y:     f64,
}

impl Layout {
  fn new() -> Self {
    Self { pages: vec![Vec::new()], y: PAGE_HEIGHT - MARGIN }
  }

  /// Emit `text`, wrapping it to the content width.
  fn text(&mut self, font: Font, size: f64, text: &str) {
    for line in wrap(text, size, PAGE_WIDTH - 2.0 * MARGIN) {
      let height = size * LINE_SPACING;
      if self.y - height < MARGIN && !self.current().is_empty() {
        self.page_break();
      }
      self.y -= height;
      let y = self.y;
      self.current().push(Placed { font, size, x: MARGIN, y, text: line });
    }
  }

  /// Vertical gap of `lines` blank lines at `size`.
  fn gap(&mut self, size: f64, lines: f64) {
    self.y -= size * LINE_SPACING * lines;
  }

  fn page_break(&mut self) {
    self.pages.push(Vec::new());
    self.y = PAGE_HEIGHT - MARGIN;
  }

  fn current(&mut self) -> &mut Vec<Placed> {
    if self.pages.is_empty() {
      self.pages.push(Vec::new());
    }
    let last = self.pages.len() - 1;
    &mut self.pages[last]
  }
}

/// Greedy word wrap that keeps the input's spacing. Lines break only at
/// whitespace runs, and the run at a break is dropped. A single word wider
/// than the line is split by characters.
fn wrap(text: &str, size: f64, width: f64) -> Vec<String> {
  let max_chars = ((width / (size * AVG_GLYPH_WIDTH)).floor() as usize).max(1);
  let mut lines = Vec::new();

  for paragraph in text.split('\n') {
    let mut line = String::new();
    let mut line_len = 0usize;
    let mut rest = paragraph;

    while !rest.is_empty() {
      let gap_end = rest.find(|c: char| !c.is_whitespace()).unwrap_or(rest.len());
      let (gap, after) = rest.split_at(gap_end);
      let word_end = after.find(char::is_whitespace).unwrap_or(after.len());
      let (word, after) = after.split_at(word_end);
      rest = after;

      let gap_len = gap.chars().count();
      let word_len = word.chars().count();
      if word.is_empty() && line_len + gap_len > max_chars {
        break;
      }
      if line_len + gap_len + word_len <= max_chars {
        line.push_str(gap);
        line.push_str(word);
        line_len += gap_len + word_len;
        continue;
      }

      if line_len > 0 {
        lines.push(std::mem::take(&mut line));
      }
      let mut chars: Vec<char> = word.chars().collect();
      while chars.len() > max_chars {
        let tail = chars.split_off(max_chars);
        lines.push(chars.into_iter().collect());
        chars = tail;
      }
      line_len = chars.len();
      line = chars.into_iter().collect();
    }
    lines.push(line);
  }
  lines
}

// ─── Report ──────────────────────────────────────────────────────────────────

fn layout_report(meta: &ExportMeta, analytics: &SurveyAnalytics) -> Layout {
  let mut layout = Layout::new();

  let title = if meta.title.is_empty() { "Survey Report" } else { &meta.title };
  layout.text(Font::Bold, 18.0, title);
  layout.gap(18.0, 1.0);

  layout.text(Font::Regular, 10.0, &format!("Survey ID: {}", meta.survey_id));
  layout.text(Font::Regular, 10.0, &format!("Anonymous: {}", meta.is_anonymous));
  if let Some(start) = &meta.start_date {
    layout.text(Font::Regular, 10.0, &format!("Start Date: {start}"));
  }
  if let Some(end) = &meta.end_date {
    layout.text(Font::Regular, 10.0, &format!("End Date: {end}"));
  }
  layout.text(
    Font::Regular,
    10.0,
    &format!("Generated At: {}", format_timestamp(meta.generated_at)),
  );
  layout.gap(10.0, 1.0);

  for (_, summary) in analytics.likert.iter() {
    layout.text(Font::Bold, 12.0, &summary.label);
    layout.text(Font::Regular, 10.0, &summary.counts.compact("  "));
    layout.gap(10.0, 0.5);
  }

  layout
}

/// Render the summary report: title, metadata, then one histogram line per
/// likert question. Raw responses are never included.
pub fn render_pdf(meta: &ExportMeta, analytics: &SurveyAnalytics) -> Vec<u8> {
  let layout = layout_report(meta, analytics);
  write_document(&layout.pages, &meta.title, meta.generated_at)
}

// ─── Serialisation ───────────────────────────────────────────────────────────

/// Object numbers: 1 catalog, 2 page tree, 3–4 fonts, 5 info, then a
/// (page, content) pair per page.
fn write_document(pages: &[Vec<Placed>], title: &str, created: DateTime<Utc>) -> Vec<u8> {
  let mut doc = PdfWriter::new();
  let page_ids: Vec<usize> = (0..pages.len()).map(|i| 6 + 2 * i).collect();

  doc.object(1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());

  let kids = page_ids
    .iter()
    .map(|id| format!("{id} 0 R"))
    .collect::<Vec<_>>()
    .join(" ");
  doc.object(
    2,
    format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()).into_bytes(),
  );

  doc.object(3, font_dict("Helvetica"));
  doc.object(4, font_dict("Helvetica-Bold"));

  let mut info = b"<< /Title ".to_vec();
  info.extend(string_literal(title));
  info.extend(
    format!(
      " /Producer (Tally) /CreationDate (D:{}Z) >>",
      created.format("%Y%m%d%H%M%S")
    )
    .into_bytes(),
  );
  doc.object(5, info);

  for (page, id) in pages.iter().zip(&page_ids) {
    let content_id = id + 1;
    doc.object(
      *id,
      format!(
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
         /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {content_id} 0 R >>"
      )
      .into_bytes(),
    );

    let stream = content_stream(page);
    let mut body = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
    body.extend(stream);
    body.extend(b"\nendstream");
    doc.object(content_id, body);
  }

  doc.finish(5)
}

fn font_dict(base: &str) -> Vec<u8> {
  format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>")
    .into_bytes()
}

fn content_stream(page: &[Placed]) -> Vec<u8> {
  let mut out = Vec::new();
  for run in page {
    let mut op = String::new();
    // Infallible for String.
    let _ = write!(
      op,
      "BT /{} {} Tf {:.2} {:.2} Td ",
      run.font.resource(),
      run.size,
      run.x,
      run.y
    );
    out.extend(op.into_bytes());
    out.extend(string_literal(&run.text));
    out.extend(b" Tj ET\n");
  }
  out
}

/// A PDF literal string. Characters outside Latin-1 become `?`.
fn string_literal(text: &str) -> Vec<u8> {
  let mut out = Vec::with_capacity(text.len() + 2);
  out.push(b'(');
  for c in text.chars() {
    match c {
      '\\' | '(' | ')' => {
        out.push(b'\\');
        out.push(c as u8);
      }
      c if (' '..='~').contains(&c) || ('\u{a0}'..='\u{ff}').contains(&c) => {
        out.push(c as u32 as u8);
      }
      _ => out.push(b'?'),
    }
  }
  out.push(b')');
  out
}

/// Tracks byte offsets of each object for the cross-reference table.
struct PdfWriter {
  buf:     Vec<u8>,
  offsets: Vec<(usize, usize)>,
}

impl PdfWriter {
  fn new() -> Self {
    let mut buf = b"%PDF-1.4\n".to_vec();
    // Binary marker so transports treat the file as binary.
    buf.extend(b"%\xE2\xE3\xCF\xD3\n");
    Self { buf, offsets: Vec::new() }
  }

  fn object(&mut self, id: usize, body: Vec<u8>) {
    self.offsets.push((id, self.buf.len()));
    self.buf.extend(format!("{id} 0 obj\n").into_bytes());
    self.buf.extend(body);
    self.buf.extend(b"\nendobj\n");
  }

  fn finish(mut self, info_id: usize) -> Vec<u8> {
    self.offsets.sort_unstable();
    let size = self.offsets.len() + 1;
    let xref_at = self.buf.len();

    let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
    for (_, offset) in &self.offsets {
      let _ = writeln!(xref, "{offset:010} 00000 n ");
    }
    let _ = write!(
      xref,
      "trailer\n<< /Size {size} /Root 1 0 R /Info {info_id} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n"
    );
    self.buf.extend(xref.into_bytes());
    self.buf
  }
}
