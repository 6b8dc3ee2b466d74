//! Transformation module.
//!
//! - Fallback: keyword-matched deterministic rules
//! - Summary: per-column descriptive statistics
//! - Pipeline: generation with fallback

pub mod fallback;
pub mod pipeline;
pub mod summary;

pub use fallback::{apply_fallback, FallbackRule, FallbackTransformer, RULE_KEYWORDS};
pub use pipeline::*;
pub use summary::describe;
