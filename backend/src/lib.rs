//! # Refiner - instruction-driven table transformation
//!
//! Refiner applies a free-text instruction ("remove empty rows", "convert to
//! uppercase", ...) to a CSV table. A local generation runtime is tried first
//! when requested; whenever it is missing, fails, or answers with something
//! that is not a table, a keyword-matched deterministic rule is applied.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Refiner         │────▶│  CSV output │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │  (model/fallback)│     │             │
//! └─────────────┘     └─────────────┘     └──────────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use refiner::{refine_csv, LogBroadcaster, RefineRequest, Refiner, RefinerConfig};
//!
//! let refiner = Refiner::from_config(&RefinerConfig::from_env()?, LogBroadcaster::default());
//! let request = RefineRequest::new("remove empty rows").with_generation(true);
//! let report = refine_csv(&refiner, "input.csv".as_ref(), &request)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error hierarchy
//! - [`models`] - Table, Column, Cell
//! - [`parser`] - CSV decoding and model output parsing
//! - [`transform`] - Fallback rules, summary statistics, pipeline
//! - [`cache`] - Generation response cache
//! - [`ai`] - Local generation runtime
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server and status logging

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Caching
pub mod cache;

// AI
pub mod ai;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    ConfigError, CsvError, GenerationError, ParseError, PipelineError, ServerError, TableError,
};

// =============================================================================
// Re-exports - Models & config
// =============================================================================

pub use config::{RefinerConfig, RuntimeConfig};
pub use models::{Cell, Column, Table};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    parse_csv_str, parse_response, ParseResult,
};

// =============================================================================
// Re-exports - Generation
// =============================================================================

pub use ai::{GenerationInvoker, Generator, LocalRuntime};
pub use cache::{CacheKey, ResponseCache};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    apply_fallback, describe, refine_bytes, refine_csv, FallbackRule, ProcessOutcome,
    RefineReport, RefineRequest, Refined, Refiner, StatusEvent, Strategy,
};

// =============================================================================
// Re-exports - Logging
// =============================================================================

pub use api::logs::{LogBroadcaster, LogEntry, LogLevel};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
