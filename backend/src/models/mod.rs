//! Table model exchanged between pipeline stages.
//!
//! - [`Cell`] - A scalar value: number, text, or null
//! - [`Column`] - A named, ordered sequence of cells
//! - [`Table`] - Ordered columns of equal length with unique names
//!
//! Tables are values: every pipeline stage builds a new [`Table`] rather than
//! mutating its input.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::TableError;

/// Strings treated as missing values when inferring cells from text.
const NULL_MARKERS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

// =============================================================================
// Cell
// =============================================================================

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Absent value.
    Null,
    /// Numeric value.
    Number(f64),
    /// Textual value.
    Text(String),
}

impl Cell {
    /// Infer a cell from a raw CSV field.
    ///
    /// Empty fields and common null markers become [`Cell::Null`], anything
    /// parseable as `f64` becomes a number, the rest stays text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || NULL_MARKERS.contains(&trimmed) {
            return Cell::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => Cell::Number(n),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the cell as a CSV field.
    pub fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Integral values print without a fractional part (`30`, not `30.0`).
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// =============================================================================
// Column
// =============================================================================

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// =============================================================================
// Table
// =============================================================================

/// An ordered set of equally long, uniquely named columns.
///
/// `row_labels` is an optional row index. It is only set on derived tables
/// such as summaries, where each row is a named statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    columns: Vec<Column>,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_labels: Option<Vec<String>>,
}

impl Table {
    /// Build a table, checking equal lengths and unique names.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let expected = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();

        for column in &columns {
            if column.len() != expected {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected,
                    found: column.len(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self {
            columns,
            row_labels: None,
        })
    }

    /// Build a table from a header and row-major records.
    ///
    /// Rows shorter than the header are padded with nulls, longer rows are
    /// truncated.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, TableError> {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for row in rows {
            let mut values = row.into_iter();
            for column in columns.iter_mut() {
                column.cells.push(values.next().unwrap_or(Cell::Null));
            }
        }

        Self::new(columns)
    }

    /// Attach row labels, one per row.
    pub fn with_row_labels(mut self, labels: Vec<String>) -> Result<Self, TableError> {
        if labels.len() != self.row_count() {
            return Err(TableError::LabelMismatch {
                rows: self.row_count(),
                labels: labels.len(),
            });
        }
        self.row_labels = Some(labels);
        Ok(self)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_labels(&self) -> Option<&[String]> {
        self.row_labels.as_deref()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Cells of row `index`, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.cells[index]).collect())
    }

    /// Iterate over rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Cell>> + '_ {
        (0..self.row_count()).map(move |i| self.columns.iter().map(|c| &c.cells[i]).collect())
    }

    /// Render the table as comma-separated text with a header row.
    ///
    /// Row labels, when present, are written as a leading column with an
    /// empty header.
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

        let labels = self.row_labels.as_deref();
        let mut header: Vec<&str> = Vec::with_capacity(self.columns.len() + 1);
        if labels.is_some() {
            header.push("");
        }
        header.extend(self.columns.iter().map(|c| c.name.as_str()));
        writer.write_record(&header)?;

        for (i, row) in self.rows().enumerate() {
            let mut record: Vec<String> = Vec::with_capacity(row.len() + 1);
            if let Some(labels) = labels {
                record.push(labels[i].clone());
            }
            record.extend(row.iter().map(|c| c.render()));
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Table {
        Table::new(vec![
            Column::new("name", vec!["alice".into(), "bob".into()]),
            Column::new("age", vec![Cell::Null, Cell::Number(30.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_infer_cells() {
        assert_eq!(Cell::infer(""), Cell::Null);
        assert_eq!(Cell::infer("  "), Cell::Null);
        assert_eq!(Cell::infer("NaN"), Cell::Null);
        assert_eq!(Cell::infer("30"), Cell::Number(30.0));
        assert_eq!(Cell::infer(" 2.5 "), Cell::Number(2.5));
        assert_eq!(Cell::infer("alice"), Cell::Text("alice".into()));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = Table::new(vec![
            Column::new("a", vec![Cell::Null]),
            Column::new("b", vec![]),
        ]);
        assert!(matches!(result, Err(TableError::LengthMismatch { .. })));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = Table::new(vec![
            Column::new("a", vec![Cell::Null]),
            Column::new("a", vec![Cell::Null]),
        ]);
        assert_eq!(result, Err(TableError::DuplicateColumn("a".into())));
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Cell::Number(1.0)], vec![Cell::Number(2.0), Cell::Number(3.0)]],
        )
        .unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("b").unwrap().cells[0], Cell::Null);
    }

    #[test]
    fn test_to_csv() {
        let csv = people().to_csv().unwrap();
        assert_eq!(csv, "name,age\nalice,\nbob,30\n");
    }

    #[test]
    fn test_to_csv_quotes_and_fractions() {
        let table = Table::new(vec![
            Column::new("title", vec!["Hello, world".into()]),
            Column::new("score", vec![Cell::Number(2.5)]),
        ])
        .unwrap();

        assert_eq!(table.to_csv().unwrap(), "title,score\n\"Hello, world\",2.5\n");
    }

    #[test]
    fn test_to_csv_with_row_labels() {
        let table = Table::new(vec![Column::new("x", vec![Cell::Number(1.0), Cell::Number(2.0)])])
            .unwrap()
            .with_row_labels(vec!["min".into(), "max".into()])
            .unwrap();

        assert_eq!(table.to_csv().unwrap(), ",x\nmin,1\nmax,2\n");
    }

    #[test]
    fn test_rows_iterate_in_order() {
        let table = people();
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], &Cell::Text("bob".into()));
        assert!(table.row(2).is_none());
    }
}
