//! AI module - delegate a transformation to a local model
//!
//! Serializes the table as CSV, sends it with the instruction to the local
//! generation runtime, and returns the raw answer. Parsing is left to
//! [`crate::parser::response`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use refiner::ai::{GenerationInvoker, Generator};
//! use refiner::config::RefinerConfig;
//!
//! let invoker = GenerationInvoker::from_config(&RefinerConfig::default(), logs);
//! if invoker.is_available() {
//!     let text = invoker.generate("Remove empty rows", &table, "llama2")?;
//! }
//! ```

pub mod prompt;
pub mod runtime;

use std::sync::{Mutex, MutexGuard};

use crate::api::logs::LogBroadcaster;
use crate::cache::{CacheKey, ResponseCache};
use crate::config::{RefinerConfig, RuntimeConfig};
use crate::error::GenerationResult;
use crate::models::Table;

pub use prompt::build_payload;
pub use runtime::LocalRuntime;

/// Something that can turn (instruction, table, model) into raw text.
///
/// Implemented by [`GenerationInvoker`]; the pipeline is generic over it.
pub trait Generator: Send + Sync {
    /// Whether generation can be attempted on this host.
    fn is_available(&self) -> bool;

    /// Raw model output for the request.
    fn generate(&self, instruction: &str, table: &Table, model: &str) -> GenerationResult<String>;
}

/// Runs the local runtime, memoizing successful answers
pub struct GenerationInvoker {
    runtime: LocalRuntime,
    cache: Mutex<ResponseCache>,
    logs: LogBroadcaster,
}

impl GenerationInvoker {
    pub fn new(runtime: RuntimeConfig, cache_capacity: usize, logs: LogBroadcaster) -> Self {
        Self {
            runtime: LocalRuntime::new(runtime, logs.clone()),
            cache: Mutex::new(ResponseCache::with_capacity(cache_capacity)),
            logs,
        }
    }

    pub fn from_config(config: &RefinerConfig, logs: LogBroadcaster) -> Self {
        Self::new(config.runtime.clone(), config.cache_capacity, logs)
    }

    pub fn runtime(&self) -> &LocalRuntime {
        &self.runtime
    }

    /// Number of cached responses
    pub fn cached(&self) -> usize {
        self.lock_cache().len()
    }

    /// Entries are plain strings, so a poisoned lock is still consistent.
    fn lock_cache(&self) -> MutexGuard<'_, ResponseCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Generator for GenerationInvoker {
    fn is_available(&self) -> bool {
        self.runtime.is_available()
    }

    fn generate(&self, instruction: &str, table: &Table, model: &str) -> GenerationResult<String> {
        let data = table.to_csv()?;
        let key = CacheKey::new(instruction, &data, model);

        let cached = self.lock_cache().get(&key);
        if let Some(hit) = cached {
            self.logs.info("Reusing cached model response");
            return Ok(hit);
        }

        // Lock released while the runtime works; identical concurrent
        // requests may both run.
        self.logs.info(format!(
            "Sending {} rows x {} columns to {}...",
            table.row_count(),
            table.column_count(),
            model
        ));
        let payload = build_payload(instruction, &data);
        let text = self.runtime.run_model(model, &payload).map_err(|e| {
            self.logs.error(format!("Error in querying {}: {}", model, e));
            e
        })?;

        self.logs.success(format!("Received {} bytes", text.len()));
        self.lock_cache().insert(key, text.clone());
        Ok(text)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::runtime::test_support::*;
    use super::*;
    use crate::error::GenerationError;
    use crate::models::{Cell, Column};
    use tempfile::tempdir;

    fn table() -> Table {
        Table::new(vec![
            Column::new("name", vec!["alice".into(), "bob".into()]),
            Column::new("age", vec![Cell::Null, 30.0.into()]),
        ])
        .unwrap()
    }

    fn invoker(config: RuntimeConfig) -> GenerationInvoker {
        GenerationInvoker::new(config, 10, LogBroadcaster::silent())
    }

    #[test]
    fn test_identical_calls_invoke_once() {
        let dir = tempdir().unwrap();
        let counter = dir.path().join("calls");
        let generator = invoker(script_runtime(dir.path(), &counting_script(&counter, "name,age\nbob,30\n")));

        let first = generator.generate("remove empty rows", &table(), "llama2").unwrap();
        let second = generator.generate("remove empty rows", &table(), "llama2").unwrap();

        assert_eq!(first, second);
        assert_eq!(invocations(&counter), 1);
        assert_eq!(generator.cached(), 1);
    }

    #[test]
    fn test_different_model_invokes_again() {
        let dir = tempdir().unwrap();
        let counter = dir.path().join("calls");
        let generator = invoker(script_runtime(dir.path(), &counting_script(&counter, "a\n1\n")));

        generator.generate("clean", &table(), "llama2").unwrap();
        generator.generate("clean", &table(), "mistral").unwrap();
        generator.generate("tidy", &table(), "llama2").unwrap();

        assert_eq!(invocations(&counter), 3);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let dir = tempdir().unwrap();
        let counter = dir.path().join("calls");
        let body = format!("echo call >> '{}'\necho 'boom' >&2\nexit 1\n", counter.display());
        let generator = invoker(script_runtime(dir.path(), &body));

        for _ in 0..2 {
            let result = generator.generate("clean", &table(), "llama2");
            assert!(matches!(result, Err(GenerationError::Exited { .. })));
        }

        assert_eq!(invocations(&counter), 2);
        assert_eq!(generator.cached(), 0);
    }

    #[test]
    fn test_payload_embeds_data_and_instruction() {
        let dir = tempdir().unwrap();
        let generator = invoker(script_runtime(dir.path(), "printf '%s' \"$3\"\n"));

        let echoed = generator.generate("Uppercase names", &table(), "llama2").unwrap();
        assert_eq!(echoed, build_payload("Uppercase names", "name,age\nalice,\nbob,30\n"));
    }

    #[test]
    fn test_availability_delegates_to_runtime() {
        let dir = tempdir().unwrap();
        let counter = dir.path().join("calls");
        let generator = invoker(script_runtime(dir.path(), &counting_script(&counter, "")));

        assert!(generator.is_available());
        assert_eq!(invocations(&counter), 0);
    }
}
