//! Error types for the Refiner pipeline.
//!
//! This module defines the error hierarchy used across the crate:
//!
//! - [`TableError`] - Table invariant violations
//! - [`CsvError`] - Input CSV decoding errors
//! - [`GenerationError`] - Generation runtime failures
//! - [`ParseError`] - Generation output that is not valid CSV
//! - [`ConfigError`] - Invalid configuration values
//! - [`PipelineError`] - Top-level errors outside the fallback taxonomy
//! - [`ServerError`] - HTTP surface errors
//!
//! `GenerationError` and `ParseError` never leave the pipeline coordinator:
//! they trigger the deterministic fallback instead.

use thiserror::Error;

// =============================================================================
// Table Errors
// =============================================================================

/// Violations of the [`crate::models::Table`] invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// A column does not have the same length as the first column.
    #[error("Column '{column}' has {found} cells, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Two columns share the same name.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// Row labels do not match the row count.
    #[error("Table has {rows} rows but {labels} row labels")]
    LabelMismatch { rows: usize, labels: usize },
}

// =============================================================================
// CSV Decoding Errors
// =============================================================================

/// Errors while decoding an uploaded CSV file into a table.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Content could not be decoded with the detected encoding.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Invalid CSV format.
    #[error("Invalid CSV format: {0}")]
    Malformed(#[from] csv::Error),

    /// Decoded columns violate the table invariants.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),

    /// Empty file.
    #[error("CSV file is empty")]
    Empty,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// Generation Errors
// =============================================================================

/// Failures of the external generation runtime.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The runtime binary could not be started.
    #[error("Failed to start generation runtime '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child process failed.
    #[error("Failed to wait for generation runtime: {0}")]
    Wait(#[source] std::io::Error),

    /// The runtime exceeded its time budget and was killed.
    #[error("Generation runtime timed out after {timeout:?}")]
    TimedOut { timeout: std::time::Duration },

    /// The runtime exited unsuccessfully.
    #[error("Generation runtime exited with {}: {stderr}", exit_label(.code))]
    Exited { code: Option<i32>, stderr: String },

    /// The input table could not be serialized for the request payload.
    #[error("Failed to serialize table: {0}")]
    Serialize(#[from] csv::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

// =============================================================================
// Response Parse Errors
// =============================================================================

/// Errors when interpreting generation output as CSV.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Output was empty or whitespace only.
    #[error("Generation output is empty")]
    Empty,

    /// First line did not look like a header.
    #[error("Generation output has no header row")]
    NoHeader,

    /// A data row has a different field count than the header.
    #[error("Line {line} has {found} fields, expected {expected}")]
    InconsistentRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// Header present but no data rows follow.
    #[error("Generation output contains no data rows")]
    NoRows,

    /// The CSV reader rejected the text.
    #[error("Malformed CSV output: {0}")]
    Malformed(#[from] csv::Error),

    /// Parsed columns violate the table invariants.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be parsed.
    #[error("Invalid value for {var}: '{value}' ({message})")]
    InvalidValue {
        var: &'static str,
        value: String,
        message: String,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Errors that escape the refinement pipeline.
///
/// Anything here is outside the anticipated fallback taxonomy and is shown to
/// users as a generic processing failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Table construction error.
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Artifact encoding error.
    #[error("Failed to encode output: {0}")]
    Encode(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal failure (e.g. a worker task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV decoding.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for generation calls.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
