//! REST API types for frontend integration.
//!
//! Tables are sent both as JSON rows (for display) and as the CSV artifact
//! (for download).

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::Cell;
use crate::transform::pipeline::{ProcessOutcome, RefineReport, StatusEvent, Strategy};

/// Message shown for any failure outside the fallback path
pub const GENERIC_FAILURE: &str = "Failed to process data. Check logs for details.";

/// Response sent to frontend after upload and refinement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "ready" when a table was produced, "warning" for empty input
    pub status: String,

    /// Path that produced the table; absent for empty input
    pub strategy: Option<Strategy>,

    pub row_count: usize,
    pub columns: Vec<String>,

    /// Index labels (summary output only)
    pub row_labels: Option<Vec<String>>,

    /// Rows in column order
    pub rows: Vec<Vec<Cell>>,

    /// Downloadable artifact
    pub csv: Option<String>,

    /// Status signals emitted during processing
    pub events: Vec<EventView>,

    /// Input file metadata
    pub input: InputMetadata,
}

/// A status event with its display text
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    #[serde(flatten)]
    pub event: StatusEvent,
    pub level: crate::api::logs::LogLevel,
    pub message: String,
}

impl From<StatusEvent> for EventView {
    fn from(event: StatusEvent) -> Self {
        Self {
            level: event.level(),
            message: event.message(),
            event,
        }
    }
}

/// Decoded input metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMetadata {
    pub file_name: Option<String>,
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl RefineResponse {
    /// Build the response, encoding the artifact.
    pub fn from_report(report: RefineReport, file_name: Option<String>) -> Result<Self, csv::Error> {
        let input = InputMetadata {
            file_name,
            encoding: report.csv_info.encoding,
            delimiter: crate::transform::pipeline::format_delimiter(report.csv_info.delimiter),
            row_count: report.csv_info.row_count,
            columns: report.csv_info.headers,
        };
        let events = report.outcome.events().into_iter().map(EventView::from).collect();

        let response = match report.outcome {
            ProcessOutcome::EmptyInput => RefineResponse {
                job_id: Uuid::new_v4().to_string(),
                status: "warning".to_string(),
                strategy: None,
                row_count: 0,
                columns: Vec::new(),
                row_labels: None,
                rows: Vec::new(),
                csv: None,
                events,
                input,
            },
            ProcessOutcome::Completed(refined) => {
                let table = refined.table;
                RefineResponse {
                    job_id: Uuid::new_v4().to_string(),
                    status: "ready".to_string(),
                    strategy: Some(refined.strategy),
                    row_count: table.row_count(),
                    columns: table.column_names().into_iter().map(str::to_string).collect(),
                    row_labels: table.row_labels().map(<[String]>::to_vec),
                    rows: table
                        .rows()
                        .map(|row| row.into_iter().cloned().collect())
                        .collect(),
                    csv: Some(table.to_csv()?),
                    events,
                    input,
                }
            }
        };

        Ok(response)
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "rowCount": 0,
        "rows": [],
        "events": []
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Table};
    use crate::transform::fallback::FallbackRule;
    use crate::transform::pipeline::{CsvInfo, Refined};

    fn csv_info() -> CsvInfo {
        CsvInfo {
            encoding: "UTF-8".into(),
            delimiter: '\t',
            headers: vec!["name".into()],
            row_count: 1,
        }
    }

    #[test]
    fn test_completed_response() {
        let table = Table::new(vec![Column::new("name", vec!["ALICE".into()])]).unwrap();
        let report = RefineReport {
            csv_info: csv_info(),
            outcome: ProcessOutcome::Completed(Refined {
                table,
                strategy: Strategy::Fallback { rule: FallbackRule::Uppercase },
                events: vec![StatusEvent::UsingFallback { rule: FallbackRule::Uppercase }],
            }),
        };

        let response = RefineResponse::from_report(report, Some("people.csv".into())).unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "ready");
        assert_eq!(json["strategy"]["kind"], "fallback");
        assert_eq!(json["strategy"]["rule"], "uppercase");
        assert_eq!(json["rows"][0][0], "ALICE");
        assert_eq!(json["csv"], "name\nALICE\n");
        assert_eq!(json["events"][0]["event"], "using_fallback");
        assert_eq!(json["events"][0]["level"], "info");
        assert_eq!(json["input"]["delimiter"], "TAB");
        assert_eq!(json["input"]["fileName"], "people.csv");
    }

    #[test]
    fn test_empty_input_response() {
        let report = RefineReport {
            csv_info: CsvInfo { row_count: 0, ..csv_info() },
            outcome: ProcessOutcome::EmptyInput,
        };

        let json = serde_json::to_value(RefineResponse::from_report(report, None).unwrap()).unwrap();

        assert_eq!(json["status"], "warning");
        assert!(json["csv"].is_null());
        assert_eq!(json["events"][0]["event"], "empty_input");
    }

    #[test]
    fn test_error_response_shape() {
        let value = error_response(GENERIC_FAILURE);
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], GENERIC_FAILURE);
        assert!(value["jobId"].as_str().is_some());
    }
}
