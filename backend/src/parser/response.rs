//! Parse generation output as a CSV table.
//!
//! Models often wrap their answer in a Markdown code fence even when told not
//! to, so a single surrounding fence is stripped before parsing. Everything
//! else must be strict CSV: a header line, then rows with the same number of
//! fields.

use once_cell::sync::Lazy;
use regex::Regex;

use super::dedupe_headers;
use crate::error::ParseError;
use crate::models::{Cell, Table};

/// Fenced block, optionally tagged (```csv).
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```$").expect("valid fence regex")
});

/// Interpret `text` as CSV and build a table in header order.
pub fn parse_response(text: &str) -> Result<Table, ParseError> {
    let body = strip_fence(text.trim());
    if body.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let raw_headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if raw_headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::NoHeader);
    }
    let headers = dedupe_headers(raw_headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        if record.len() != headers.len() {
            return Err(ParseError::InconsistentRow {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: headers.len(),
                found: record.len(),
            });
        }
        rows.push(record.iter().map(Cell::infer).collect());
    }

    if rows.is_empty() {
        return Err(ParseError::NoRows);
    }

    Ok(Table::from_rows(headers, rows)?)
}

/// Remove a single Markdown fence wrapping the whole text.
fn strip_fence(text: &str) -> &str {
    FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}
