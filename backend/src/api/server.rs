//! HTTP Server for the refiner API.
//!
//! Provides REST endpoints for CSV upload and refinement.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | GET    | `/api/runtime`    | Generation runtime availability      |
//! | POST   | `/api/refine`     | Upload CSV with an instruction       |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::LogBroadcaster;
use super::types::{error_response, RefineResponse, GENERIC_FAILURE};
use crate::ai::Generator;
use crate::config::RefinerConfig;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::transform::pipeline::{refine_bytes, RefineRequest, Refiner};

/// Shared by all handlers
pub struct AppState {
    pub refiner: Refiner,
    pub logs: LogBroadcaster,
}

pub type SharedState = Arc<AppState>;
type ApiError = (StatusCode, Json<Value>);

/// Build the router around an existing pipeline.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/runtime", get(runtime_status))
        .route("/api/refine", post(refine_upload))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: RefinerConfig, port: u16) -> ServerResult<()> {
    let logs = LogBroadcaster::default();
    let state = Arc::new(AppState {
        refiner: Refiner::from_config(&config, logs.clone()),
        logs,
    });
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Refiner server running on http://localhost:{}", port);
    println!("   POST /api/refine  - Upload CSV with instruction");
    println!("   GET  /api/runtime - Generation runtime status");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");
    println!();
    println!(
        "🤖 Runtime: {} (default model: {})",
        config.runtime.program.display(),
        config.model
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "refiner",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "refine": "POST /api/refine",
            "runtime": "GET /api/runtime",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// Probe the generation runtime
async fn runtime_status(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let probe = state.clone();
    let available = tokio::task::spawn_blocking(move || probe.refiner.generator().is_available())
        .await
        .map_err(|e| reject(&state.logs, ServerError::Internal(e.to_string())))?;

    Ok(Json(json!({
        "available": available,
        "model": state.refiner.default_model(),
    })))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs(State(state): State<SharedState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.logs.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload fields collected from the multipart body
#[derive(Default)]
struct RefineForm {
    file_name: Option<String>,
    file: Option<Vec<u8>>,
    instruction: String,
    use_ai: bool,
    model: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> ServerResult<RefineForm> {
    let mut form = RefineForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                form.file = Some(bytes.to_vec());
            }
            "instruction" | "useAi" | "model" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                match name.as_str() {
                    "instruction" => form.instruction = text,
                    "useAi" => form.use_ai = parse_flag(&text),
                    _ => form.model = Some(text),
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Upload and refine endpoint
async fn refine_upload(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<RefineResponse>, ApiError> {
    let form = read_form(multipart).await.map_err(|e| reject(&state.logs, e))?;

    let bytes = form
        .file
        .ok_or_else(|| reject(&state.logs, ServerError::BadRequest("No file provided".into())))?;

    state.logs.info(format!(
        "📄 New upload: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let request = RefineRequest::new(form.instruction)
        .with_generation(form.use_ai)
        .with_model(form.model);

    let worker = state.clone();
    let report = tokio::task::spawn_blocking(move || refine_bytes(&worker.refiner, &bytes, &request))
        .await
        .map_err(|e| PipelineError::Internal(format!("Worker failed: {}", e)))
        .and_then(|result| result)
        .map_err(|e| reject(&state.logs, ServerError::Pipeline(e)))?;

    let response = RefineResponse::from_report(report, form.file_name)
        .map_err(|e| reject(&state.logs, ServerError::Pipeline(PipelineError::Encode(e))))?;

    Ok(Json(response))
}

/// Log the full error and map it to a status code.
///
/// Client mistakes and undecodable files keep their message; everything else
/// is reported generically.
fn reject(logs: &LogBroadcaster, err: ServerError) -> ApiError {
    logs.error(format!("Request failed: {}", err));
    match err {
        ServerError::BadRequest(message) => {
            (StatusCode::BAD_REQUEST, Json(error_response(&message)))
        }
        ServerError::Pipeline(PipelineError::Csv(e)) => {
            (StatusCode::BAD_REQUEST, Json(error_response(&e.to_string())))
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(GENERIC_FAILURE)),
        ),
    }
}
