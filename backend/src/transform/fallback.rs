//! Keyword-matched deterministic transformations.
//!
//! Used whenever generation is disabled, unavailable, or unusable. The
//! instruction is matched case-insensitively against a fixed priority list;
//! the first keyword found selects the rule.
//!
//! | Priority | Keyword        | Rule                                  |
//! |----------|----------------|---------------------------------------|
//! | 1        | `remove empty` | drop rows containing any null cell    |
//! | 2        | `summarize`    | per-column descriptive statistics     |
//! | 3        | `uppercase`    | uppercase every text cell             |
//! | -        | (none)         | identity                              |

use serde::{Deserialize, Serialize};

use super::summary::describe;
use crate::api::logs::LogBroadcaster;
use crate::error::TableError;
use crate::models::{Cell, Column, Table};

/// A deterministic transformation selected from the instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackRule {
    /// Drop every row that has at least one null cell
    RemoveEmpty,
    /// Replace the table with per-column summary statistics
    Summarize,
    /// Uppercase text cells, leave others untouched
    Uppercase,
    /// Return the input unchanged
    Identity,
}

/// Keywords in match order. First hit wins.
pub const RULE_KEYWORDS: [(&str, FallbackRule); 3] = [
    ("remove empty", FallbackRule::RemoveEmpty),
    ("summarize", FallbackRule::Summarize),
    ("uppercase", FallbackRule::Uppercase),
];

impl FallbackRule {
    /// Select the rule for an instruction.
    pub fn for_instruction(instruction: &str) -> Self {
        let lowered = instruction.to_lowercase();
        RULE_KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, rule)| *rule)
            .unwrap_or(FallbackRule::Identity)
    }

    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            FallbackRule::RemoveEmpty => "drop rows with missing values",
            FallbackRule::Summarize => "summary statistics per column",
            FallbackRule::Uppercase => "uppercase all text cells",
            FallbackRule::Identity => "leave data unchanged",
        }
    }

    /// Apply this rule to a table.
    pub fn apply(&self, table: &Table) -> Result<Table, TableError> {
        match self {
            FallbackRule::RemoveEmpty => remove_empty(table),
            FallbackRule::Summarize => describe(table),
            FallbackRule::Uppercase => uppercase(table),
            FallbackRule::Identity => Ok(table.clone()),
        }
    }
}

impl std::fmt::Display for FallbackRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FallbackRule::RemoveEmpty => "remove_empty",
            FallbackRule::Summarize => "summarize",
            FallbackRule::Uppercase => "uppercase",
            FallbackRule::Identity => "identity",
        };
        f.write_str(name)
    }
}

/// Applies [`FallbackRule`]s and never fails.
#[derive(Clone, Default)]
pub struct FallbackTransformer {
    logs: LogBroadcaster,
}

impl FallbackTransformer {
    pub fn new(logs: LogBroadcaster) -> Self {
        Self { logs }
    }

    /// Transform `table` according to `instruction`.
    ///
    /// On any internal error the input is returned unchanged and the error is
    /// logged.
    pub fn apply(&self, table: &Table, instruction: &str) -> (FallbackRule, Table) {
        let rule = FallbackRule::for_instruction(instruction);
        match rule.apply(table) {
            Ok(result) => (rule, result),
            Err(e) => {
                self.logs
                    .error(format!("Error in fallback transform '{}': {}", rule, e));
                (rule, table.clone())
            }
        }
    }
}

/// Convenience wrapper using the process-wide log broadcaster.
pub fn apply_fallback(table: &Table, instruction: &str) -> Table {
    FallbackTransformer::default().apply(table, instruction).1
}

fn remove_empty(table: &Table) -> Result<Table, TableError> {
    let keep: Vec<bool> = table
        .rows()
        .map(|row| row.iter().all(|cell| !cell.is_null()))
        .collect();

    let columns = table
        .columns()
        .iter()
        .map(|column| {
            let cells = column
                .cells
                .iter()
                .zip(&keep)
                .filter(|(_, keep)| **keep)
                .map(|(cell, _)| cell.clone())
                .collect();
            Column::new(column.name.clone(), cells)
        })
        .collect();

    Table::new(columns)
}

fn uppercase(table: &Table) -> Result<Table, TableError> {
    let columns = table
        .columns()
        .iter()
        .map(|column| {
            let cells = column
                .cells
                .iter()
                .map(|cell| match cell {
                    Cell::Text(s) => Cell::Text(s.to_uppercase()),
                    other => other.clone(),
                })
                .collect();
            Column::new(column.name.clone(), cells)
        })
        .collect();

    Table::new(columns)
}
