//! Runtime and model configuration.
//!
//! The pipeline itself never reads the environment; the CLI and HTTP server
//! build a [`RefinerConfig`] (usually via [`RefinerConfig::from_env`]) and pass
//! values down.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::error::ConfigError;

/// Default generation runtime binary
pub const DEFAULT_RUNTIME: &str = "ollama";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "llama2";

/// Budget for `<runtime> --version`
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for `<runtime> run <model> <payload>`
pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

const ENV_RUNTIME: &str = "REFINER_RUNTIME";
const ENV_MODEL: &str = "REFINER_MODEL";
const ENV_PROBE_TIMEOUT: &str = "REFINER_PROBE_TIMEOUT_SECS";
const ENV_GENERATE_TIMEOUT: &str = "REFINER_GENERATE_TIMEOUT_SECS";

/// How to launch the generation runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments placed before the runtime subcommand (e.g. a wrapper script)
    pub program_args: Vec<String>,
    /// Timeout for the availability probe
    pub probe_timeout: Duration,
    /// Timeout for a generation call
    pub generate_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_RUNTIME),
            program_args: Vec::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
        }
    }
}

impl RuntimeConfig {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_program_args(mut self, args: Vec<String>) -> Self {
        self.program_args = args;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }
}

/// Everything the CLI and server need to build a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinerConfig {
    pub runtime: RuntimeConfig,
    /// Model used when a request does not name one
    pub model: String,
    /// Generation cache size
    pub cache_capacity: usize,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            model: DEFAULT_MODEL.to_string(),
            cache_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RefinerConfig {
    /// Load from environment variables, reading `.env` first if present.
    ///
    /// | Variable                        | Default  |
    /// |---------------------------------|----------|
    /// | `REFINER_RUNTIME`               | `ollama` |
    /// | `REFINER_MODEL`                 | `llama2` |
    /// | `REFINER_PROBE_TIMEOUT_SECS`    | `5`      |
    /// | `REFINER_GENERATE_TIMEOUT_SECS` | `60`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(program) = non_empty(lookup(ENV_RUNTIME)) {
            config.runtime.program = PathBuf::from(program);
        }
        if let Some(model) = non_empty(lookup(ENV_MODEL)) {
            config.model = model;
        }
        if let Some(secs) = non_empty(lookup(ENV_PROBE_TIMEOUT)) {
            config.runtime.probe_timeout = parse_secs(ENV_PROBE_TIMEOUT, &secs)?;
        }
        if let Some(secs) = non_empty(lookup(ENV_GENERATE_TIMEOUT)) {
            config.runtime.generate_timeout = parse_secs(ENV_GENERATE_TIMEOUT, &secs)?;
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value.parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        message: e.to_string(),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            message: "timeout must be positive".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RefinerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.runtime.program, PathBuf::from("ollama"));
        assert_eq!(config.model, "llama2");
        assert_eq!(config.runtime.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.runtime.generate_timeout, Duration::from_secs(60));
        assert_eq!(config.cache_capacity, 10);
    }

    #[test]
    fn test_overrides() {
        let config = RefinerConfig::from_lookup(lookup(&[
            ("REFINER_RUNTIME", "/opt/ollama/bin/ollama"),
            ("REFINER_MODEL", "mistral"),
            ("REFINER_GENERATE_TIMEOUT_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(config.runtime.program, PathBuf::from("/opt/ollama/bin/ollama"));
        assert_eq!(config.model, "mistral");
        assert_eq!(config.runtime.generate_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = RefinerConfig::from_lookup(lookup(&[("REFINER_MODEL", "  ")])).unwrap();
        assert_eq!(config.model, "llama2");
    }

    #[test]
    fn test_invalid_timeout() {
        let err = RefinerConfig::from_lookup(lookup(&[("REFINER_PROBE_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("REFINER_PROBE_TIMEOUT_SECS"));

        assert!(RefinerConfig::from_lookup(lookup(&[("REFINER_PROBE_TIMEOUT_SECS", "0")])).is_err());
    }
}
