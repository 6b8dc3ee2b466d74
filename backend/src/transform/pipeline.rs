//! Pipeline coordinator: pick a strategy, fall back on failure.
//!
//! ```text
//! table + instruction
//!        │
//!        ├─ no rows ───────────────────────────────▶ EmptyInput
//!        │
//!        ├─ generation requested and available?
//!        │     yes ─▶ generate ─▶ parse ─▶ ok ────▶ Completed (generation)
//!        │                 │         │
//!        │               error     error
//!        │                 ▼         ▼
//!        └────────────────────────▶ fallback rule ─▶ Completed (fallback)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use refiner::transform::pipeline::{refine_csv, Refiner, RefineRequest};
//!
//! let refiner = Refiner::from_config(&RefinerConfig::from_env()?, LogBroadcaster::default());
//! let report = refine_csv(&refiner, Path::new("sales.csv"), &RefineRequest::new("summarize"))?;
//! ```

use serde::Serialize;
use std::path::Path;

use super::fallback::{FallbackRule, FallbackTransformer};
use crate::ai::{GenerationInvoker, Generator};
use crate::api::logs::{LogBroadcaster, LogEntry, LogLevel};
use crate::config::RefinerConfig;
use crate::error::PipelineResult;
use crate::models::Table;
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, parse_response, ParseResult};

// =============================================================================
// Status events
// =============================================================================

/// Named status signals for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Input had no rows; nothing was processed
    EmptyInput,
    /// Generation requested and the runtime answered the probe
    UsingGeneration { model: String },
    /// Generation requested but the runtime is not usable
    GenerationUnavailable,
    /// The runtime failed, timed out, or could not start
    GenerationFailed { reason: String },
    /// The runtime answered with something that is not a table
    InvalidGenerationOutput { reason: String },
    /// Generation produced a valid table
    GenerationSucceeded { rows: usize, columns: usize },
    /// The deterministic path was selected
    UsingFallback { rule: FallbackRule },
    /// The deterministic path produced its result
    FallbackApplied { rule: FallbackRule, rows: usize },
}

impl StatusEvent {
    pub fn level(&self) -> LogLevel {
        match self {
            StatusEvent::UsingGeneration { .. } | StatusEvent::UsingFallback { .. } => LogLevel::Info,
            StatusEvent::GenerationSucceeded { .. } | StatusEvent::FallbackApplied { .. } => {
                LogLevel::Success
            }
            StatusEvent::EmptyInput
            | StatusEvent::GenerationUnavailable
            | StatusEvent::GenerationFailed { .. }
            | StatusEvent::InvalidGenerationOutput { .. } => LogLevel::Warning,
        }
    }

    pub fn message(&self) -> String {
        match self {
            StatusEvent::EmptyInput => "Uploaded file is empty!".to_string(),
            StatusEvent::UsingGeneration { model } => {
                format!("🤖 Using local model '{}' for processing...", model)
            }
            StatusEvent::GenerationUnavailable => {
                "Generation runtime not available. Falling back to basic transformations.".to_string()
            }
            StatusEvent::GenerationFailed { reason } => {
                format!("Model call failed ({}). Falling back to basic transformations.", reason)
            }
            StatusEvent::InvalidGenerationOutput { reason } => format!(
                "Model response was not valid CSV ({}). Falling back to basic transformations.",
                reason
            ),
            StatusEvent::GenerationSucceeded { rows, columns } => {
                format!("✅ AI Processing Complete! ({} rows x {} columns)", rows, columns)
            }
            StatusEvent::UsingFallback { rule } => {
                format!("Using basic transformations: {} ({})", rule, rule.description())
            }
            StatusEvent::FallbackApplied { rule, rows } => {
                format!("Applied '{}' ({} rows)", rule, rows)
            }
        }
    }

    pub fn to_log_entry(&self) -> LogEntry {
        LogEntry::new(self.level(), self.message())
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Which path produced the result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    Generation { model: String },
    Fallback { rule: FallbackRule },
}

/// A processed table with the decisions that led to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refined {
    pub table: Table,
    pub strategy: Strategy,
    pub events: Vec<StatusEvent>,
}

/// Result of [`Refiner::process`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Input had zero rows; a warning, not an error
    EmptyInput,
    Completed(Refined),
}

impl ProcessOutcome {
    pub fn table(&self) -> Option<&Table> {
        match self {
            ProcessOutcome::EmptyInput => None,
            ProcessOutcome::Completed(refined) => Some(&refined.table),
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            ProcessOutcome::EmptyInput => None,
            ProcessOutcome::Completed(refined) => Some(refined.table),
        }
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        match self {
            ProcessOutcome::EmptyInput => vec![StatusEvent::EmptyInput],
            ProcessOutcome::Completed(refined) => refined.events.clone(),
        }
    }
}

/// Records events and forwards them to the log.
struct EventLog<'a> {
    logs: &'a LogBroadcaster,
    events: Vec<StatusEvent>,
}

impl<'a> EventLog<'a> {
    fn new(logs: &'a LogBroadcaster) -> Self {
        Self {
            logs,
            events: Vec::new(),
        }
    }

    fn emit(&mut self, event: StatusEvent) {
        self.logs.log(event.to_log_entry());
        self.events.push(event);
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Orchestrates generation and fallback
pub struct Refiner<G: Generator = GenerationInvoker> {
    generator: G,
    fallback: FallbackTransformer,
    logs: LogBroadcaster,
    default_model: String,
}

impl Refiner<GenerationInvoker> {
    /// Production pipeline using the local runtime
    pub fn from_config(config: &RefinerConfig, logs: LogBroadcaster) -> Self {
        Refiner::new(GenerationInvoker::from_config(config, logs.clone()), logs)
            .with_default_model(&config.model)
    }
}

impl<G: Generator> Refiner<G> {
    pub fn new(generator: G, logs: LogBroadcaster) -> Self {
        Self {
            generator,
            fallback: FallbackTransformer::new(logs.clone()),
            logs,
            default_model: crate::config::DEFAULT_MODEL.to_string(),
        }
    }

    /// Model used when a request does not name one
    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn logs(&self) -> &LogBroadcaster {
        &self.logs
    }

    /// Transform `table` according to `instruction`.
    ///
    /// Never fails: generation and parse errors are logged and routed to the
    /// deterministic fallback, which always yields a table.
    pub fn process(
        &self,
        table: &Table,
        instruction: &str,
        use_generation: bool,
        model: &str,
    ) -> ProcessOutcome {
        let mut log = EventLog::new(&self.logs);

        if table.is_empty() {
            log.emit(StatusEvent::EmptyInput);
            return ProcessOutcome::EmptyInput;
        }

        if use_generation {
            if self.generator.is_available() {
                log.emit(StatusEvent::UsingGeneration {
                    model: model.to_string(),
                });
                if let Some(parsed) = self.try_generation(&mut log, table, instruction, model) {
                    return ProcessOutcome::Completed(Refined {
                        table: parsed,
                        strategy: Strategy::Generation {
                            model: model.to_string(),
                        },
                        events: log.events,
                    });
                }
            } else {
                log.emit(StatusEvent::GenerationUnavailable);
            }
        }

        let rule = FallbackRule::for_instruction(instruction);
        log.emit(StatusEvent::UsingFallback { rule });
        let (rule, result) = self.fallback.apply(table, instruction);
        log.emit(StatusEvent::FallbackApplied {
            rule,
            rows: result.row_count(),
        });

        ProcessOutcome::Completed(Refined {
            table: result,
            strategy: Strategy::Fallback { rule },
            events: log.events,
        })
    }

    /// Generate and parse; `None` means fall back.
    fn try_generation(
        &self,
        log: &mut EventLog<'_>,
        table: &Table,
        instruction: &str,
        model: &str,
    ) -> Option<Table> {
        let text = match self.generator.generate(instruction, table, model) {
            Ok(text) => text,
            Err(e) => {
                log.emit(StatusEvent::GenerationFailed {
                    reason: e.to_string(),
                });
                return None;
            }
        };

        match parse_response(&text) {
            Ok(parsed) => {
                log.emit(StatusEvent::GenerationSucceeded {
                    rows: parsed.row_count(),
                    columns: parsed.column_count(),
                });
                Some(parsed)
            }
            Err(e) => {
                self.logs
                    .error(format!("Error in parsing AI response: {}", e));
                log.emit(StatusEvent::InvalidGenerationOutput {
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

// =============================================================================
// File-level entry points
// =============================================================================

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineRequest {
    pub instruction: String,
    pub use_generation: bool,
    /// Model override; the refiner's default when `None`
    pub model: Option<String>,
}

impl RefineRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            use_generation: false,
            model: None,
        }
    }

    pub fn with_generation(mut self, enabled: bool) -> Self {
        self.use_generation = enabled;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Decoded input plus the processing outcome
#[derive(Debug, Clone)]
pub struct RefineReport {
    pub csv_info: CsvInfo,
    pub outcome: ProcessOutcome,
}

/// Decode a CSV file and process it.
pub fn refine_csv<G: Generator>(
    refiner: &Refiner<G>,
    path: &Path,
    request: &RefineRequest,
) -> PipelineResult<RefineReport> {
    let parsed = parse_csv_file_auto(path)?;
    Ok(refine_parsed(refiner, parsed, request))
}

/// Decode CSV bytes and process them.
pub fn refine_bytes<G: Generator>(
    refiner: &Refiner<G>,
    bytes: &[u8],
    request: &RefineRequest,
) -> PipelineResult<RefineReport> {
    let parsed = parse_bytes_auto(bytes)?;
    Ok(refine_parsed(refiner, parsed, request))
}

fn refine_parsed<G: Generator>(
    refiner: &Refiner<G>,
    parsed: ParseResult,
    request: &RefineRequest,
) -> RefineReport {
    let logs = refiner.logs();
    logs.info("📖 Reading CSV file...");
    for line in [
        format!("Detected encoding: {}", parsed.encoding),
        format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)),
        format!("Read {} rows", parsed.table.row_count()),
    ] {
        logs.log(LogEntry::success(line).with_indent(1));
    }

    let csv_info = CsvInfo {
        encoding: parsed.encoding,
        delimiter: parsed.delimiter,
        headers: parsed.headers,
        row_count: parsed.table.row_count(),
    };

    let model = request.model.as_deref().unwrap_or(refiner.default_model());
    let outcome = refiner.process(&parsed.table, &request.instruction, request.use_generation, model);

    RefineReport { csv_info, outcome }
}

/// Format delimiter for display
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        c => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationError, GenerationResult};
    use crate::models::{Cell, Column};
    use crate::transform::fallback::apply_fallback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted generator for exercising each branch.
    struct FakeGenerator {
        available: bool,
        response: Result<String, i32>,
        calls: AtomicUsize,
        probes: AtomicUsize,
    }

    impl FakeGenerator {
        fn answering(text: &str) -> Self {
            Self {
                available: true,
                response: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
            }
        }

        fn exiting(code: i32) -> Self {
            Self {
                response: Err(code),
                ..Self::answering("")
            }
        }

        fn unavailable() -> Self {
            Self {
                available: false,
                ..Self::answering("name,age\nx,1\n")
            }
        }
    }

    impl Generator for FakeGenerator {
        fn is_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available
        }

        fn generate(&self, _instruction: &str, _table: &Table, _model: &str) -> GenerationResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(code) => Err(GenerationError::Exited {
                    code: Some(*code),
                    stderr: "Error: boom".to_string(),
                }),
            }
        }
    }

    fn refiner(generator: FakeGenerator) -> Refiner<FakeGenerator> {
        Refiner::new(generator, LogBroadcaster::silent())
    }

    fn people() -> Table {
        Table::new(vec![
            Column::new("name", vec!["alice".into(), "bob".into()]),
            Column::new("age", vec![Cell::Null, 30.0.into()]),
        ])
        .unwrap()
    }

    fn completed(outcome: ProcessOutcome) -> Refined {
        match outcome {
            ProcessOutcome::Completed(refined) => refined,
            ProcessOutcome::EmptyInput => panic!("unexpected empty input outcome"),
        }
    }

    #[test]
    fn test_remove_empty_rows_without_generation() {
        let r = refiner(FakeGenerator::answering("unused"));
        let refined = completed(r.process(&people(), "remove empty rows", false, "llama2"));

        assert_eq!(refined.table.row_count(), 1);
        assert_eq!(
            refined.table.row(0).unwrap(),
            vec![&Cell::Text("bob".into()), &Cell::Number(30.0)]
        );
        assert_eq!(refined.strategy, Strategy::Fallback { rule: FallbackRule::RemoveEmpty });
    }

    #[test]
    fn test_generation_disabled_matches_fallback_and_skips_probe() {
        let generator = FakeGenerator::answering("name\nZ\n");
        let r = refiner(generator);

        for instruction in ["uppercase", "summarize", "remove empty", "whatever"] {
            let refined = completed(r.process(&people(), instruction, false, "llama2"));
            assert_eq!(refined.table, apply_fallback(&people(), instruction));
        }
        assert_eq!(r.generator().probes.load(Ordering::SeqCst), 0);
        assert_eq!(r.generator().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generation_result_short_circuits_fallback() {
        let r = refiner(FakeGenerator::answering("```csv\nname,age\nBOB,30\n```"));
        let refined = completed(r.process(&people(), "remove empty rows", true, "mistral"));

        assert_eq!(refined.strategy, Strategy::Generation { model: "mistral".into() });
        assert_eq!(refined.table.column("name").unwrap().cells, vec![Cell::Text("BOB".into())]);
        assert!(refined
            .events
            .iter()
            .all(|e| !matches!(e, StatusEvent::UsingFallback { .. })));
    }

    #[test]
    fn test_generation_failure_falls_back() {
        let r = refiner(FakeGenerator::exiting(1));
        let refined = completed(r.process(&people(), "convert to uppercase", true, "llama2"));

        assert_eq!(refined.table, apply_fallback(&people(), "convert to uppercase"));
        assert_eq!(refined.strategy, Strategy::Fallback { rule: FallbackRule::Uppercase });
        assert!(matches!(refined.events[1], StatusEvent::GenerationFailed { .. }));
        assert_eq!(r.generator().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_output_falls_back() {
        let r = refiner(FakeGenerator::answering("Sorry, I cannot help with that, really."));
        let refined = completed(r.process(&people(), "remove empty", true, "llama2"));

        assert_eq!(refined.table, apply_fallback(&people(), "remove empty"));
        assert!(refined
            .events
            .iter()
            .any(|e| matches!(e, StatusEvent::InvalidGenerationOutput { .. })));
    }

    #[test]
    fn test_header_only_output_falls_back() {
        let r = refiner(FakeGenerator::answering("name,age\n"));
        let refined = completed(r.process(&people(), "summarize", true, "llama2"));

        assert_eq!(refined.strategy, Strategy::Fallback { rule: FallbackRule::Summarize });
    }

    #[test]
    fn test_unavailable_runtime_falls_back_without_calling() {
        let r = refiner(FakeGenerator::unavailable());
        let refined = completed(r.process(&people(), "uppercase", true, "llama2"));

        assert_eq!(refined.table, apply_fallback(&people(), "uppercase"));
        assert_eq!(refined.events[0], StatusEvent::GenerationUnavailable);
        assert_eq!(r.generator().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_input_returns_early() {
        let r = refiner(FakeGenerator::answering("a\n1\n"));
        let empty = Table::new(vec![Column::new("name", vec![])]).unwrap();

        assert_eq!(r.process(&empty, "uppercase", true, "llama2"), ProcessOutcome::EmptyInput);
        assert_eq!(r.generator().probes.load(Ordering::SeqCst), 0);
        assert_eq!(r.generator().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_process_is_repeatable() {
        let r = refiner(FakeGenerator::exiting(1));
        let first = r.process(&people(), "summarize", true, "llama2");
        let second = r.process(&people(), "summarize", true, "llama2");

        assert_eq!(first, second);
    }

    #[test]
    fn test_events_are_broadcast() {
        let logs = LogBroadcaster::silent();
        let mut rx = logs.subscribe();
        let r = Refiner::new(FakeGenerator::unavailable(), logs);

        r.process(&people(), "uppercase", true, "llama2");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, LogLevel::Warning);
        assert_eq!(first.message, StatusEvent::GenerationUnavailable.message());
    }

    #[test]
    fn test_refine_bytes_uses_default_model() {
        let r = refiner(FakeGenerator::answering("name\nALICE\n")).with_default_model("phi3");
        let request = RefineRequest::new("anything").with_generation(true).with_model(Some(" ".into()));

        let report = refine_bytes(&r, b"name;age\nalice;\nbob;30\n", &request).unwrap();

        assert_eq!(report.csv_info.delimiter, ';');
        assert_eq!(report.csv_info.row_count, 2);
        match report.outcome {
            ProcessOutcome::Completed(refined) => {
                assert_eq!(refined.strategy, Strategy::Generation { model: "phi3".into() });
            }
            ProcessOutcome::EmptyInput => panic!("unexpected empty input"),
        }
    }

    #[test]
    fn test_refine_bytes_header_only_is_empty_input() {
        let r = refiner(FakeGenerator::answering("unused"));
        let report = refine_bytes(&r, b"name,age\n", &RefineRequest::new("uppercase")).unwrap();

        assert_eq!(report.outcome, ProcessOutcome::EmptyInput);
    }

    #[test]
    fn test_event_levels() {
        assert_eq!(StatusEvent::EmptyInput.level(), LogLevel::Warning);
        assert_eq!(
            StatusEvent::UsingFallback { rule: FallbackRule::Identity }.level(),
            LogLevel::Info
        );
        assert_eq!(
            StatusEvent::GenerationSucceeded { rows: 1, columns: 1 }.level(),
            LogLevel::Success
        );
    }
}
