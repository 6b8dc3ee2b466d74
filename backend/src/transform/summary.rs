//! Per-column descriptive statistics.
//!
//! Produces one row per statistic and one column per input column. Numeric
//! columns get `mean, std, min, 25%, 50%, 75%, max`; categorical columns get
//! `unique, top, freq`; both share `count`. Statistics that do not apply to a
//! column are null.

use std::collections::HashMap;

use crate::error::TableError;
use crate::models::{Cell, Column, Table};

const CATEGORICAL_STATS: [&str; 3] = ["unique", "top", "freq"];
const NUMERIC_STATS: [&str; 7] = ["mean", "std", "min", "25%", "50%", "75%", "max"];

/// What a column holds once nulls are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Categorical,
}

fn column_kind(column: &Column) -> ColumnKind {
    let all_numbers = column
        .cells
        .iter()
        .filter(|c| !c.is_null())
        .all(|c| matches!(c, Cell::Number(_)));

    if all_numbers {
        ColumnKind::Numeric
    } else {
        ColumnKind::Categorical
    }
}

/// Summarize every column of `table`.
pub fn describe(table: &Table) -> Result<Table, TableError> {
    let kinds: Vec<ColumnKind> = table.columns().iter().map(column_kind).collect();
    let any_categorical = kinds.contains(&ColumnKind::Categorical);
    let any_numeric = kinds.contains(&ColumnKind::Numeric);

    let mut labels = vec!["count"];
    if any_categorical {
        labels.extend(CATEGORICAL_STATS);
    }
    if any_numeric {
        labels.extend(NUMERIC_STATS);
    }

    let columns = table
        .columns()
        .iter()
        .zip(&kinds)
        .map(|(column, kind)| {
            let stats = match kind {
                ColumnKind::Numeric => numeric_stats(column),
                ColumnKind::Categorical => categorical_stats(column),
            };
            let cells = labels
                .iter()
                .map(|label| stats.get(label).cloned().unwrap_or(Cell::Null))
                .collect();
            Column::new(column.name.clone(), cells)
        })
        .collect();

    Table::new(columns)?.with_row_labels(labels.into_iter().map(String::from).collect())
}

fn numeric_stats(column: &Column) -> HashMap<&'static str, Cell> {
    let mut values: Vec<f64> = column.cells.iter().filter_map(Cell::as_number).collect();
    let mut stats = HashMap::new();
    stats.insert("count", Cell::Number(values.len() as f64));

    if values.is_empty() {
        return stats;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    stats.insert("mean", Cell::Number(mean));
    if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        stats.insert("std", Cell::Number(variance.sqrt()));
    }
    stats.insert("min", Cell::Number(values[0]));
    stats.insert("25%", Cell::Number(quantile(&values, 0.25)));
    stats.insert("50%", Cell::Number(quantile(&values, 0.5)));
    stats.insert("75%", Cell::Number(quantile(&values, 0.75)));
    stats.insert("max", Cell::Number(values[values.len() - 1]));
    stats
}

fn categorical_stats(column: &Column) -> HashMap<&'static str, Cell> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();
    let mut count = 0usize;

    for cell in column.cells.iter().filter(|c| !c.is_null()) {
        count += 1;
        let key = cell.render();
        let entry = counts.entry(key.clone()).or_insert_with(|| {
            first_seen.push(key);
            0
        });
        *entry += 1;
    }

    let mut stats = HashMap::new();
    stats.insert("count", Cell::Number(count as f64));
    stats.insert("unique", Cell::Number(counts.len() as f64));

    // Ties resolve to the value seen first.
    let mut top: Option<(&String, usize)> = None;
    for value in &first_seen {
        let freq = counts[value];
        if top.map_or(true, |(_, best)| freq > best) {
            top = Some((value, freq));
        }
    }
    if let Some((value, freq)) = top {
        stats.insert("top", Cell::Text(value.clone()));
        stats.insert("freq", Cell::Number(freq as f64));
    }
    stats
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
