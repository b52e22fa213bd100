//! Route registration and stage-trigger handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use campsync_core::SyncError;
use campsync_pipeline::{PrepareArgs, SyncArgs};

/// Stages this service can trigger. Fetchers run elsewhere.
const STAGES: &[&str] = &["prepare", "sync"];

/// One stage run may take a while against a large account; anything past
/// this is assumed wedged.
const STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Application shared state.
#[derive(Clone)]
pub struct AppState {
    /// Concurrent runs against the same working area are undefined, so
    /// stage execution is serialised.
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stages", get(list_stages))
        .route("/run/{stage}", post(run_stage))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "campsyncd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_stages() -> impl IntoResponse {
    Json(serde_json::json!({ "available_stages": STAGES }))
}

/// Request body for `/run/{stage}`. All fields optional; defaults match
/// the CLI.
#[derive(Debug, Default, Deserialize)]
struct RunRequest {
    #[serde(default)]
    dry_run: bool,
    input: Option<String>,
    output: Option<String>,
}

async fn run_stage(
    State(state): State<AppState>,
    Path(stage): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    // An empty body means "defaults"; anything else must be valid JSON.
    let request: RunRequest = if body.is_empty() {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON payload: {}", e),
            )
        })?
    };

    if !STAGES.contains(&stage.as_str()) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!(
                "stage {:?} not available; available stages: {}",
                stage,
                STAGES.join(", ")
            ),
        ));
    }

    // One stage at a time; later requests wait their turn.
    let _guard = state.run_lock.lock().await;
    info!(stage = %stage, dry_run = request.dry_run, "stage triggered");

    let result = match stage.as_str() {
        "prepare" => {
            let mut args = PrepareArgs {
                dry_run: request.dry_run,
                ..Default::default()
            };
            if let Some(input) = request.input {
                args.input = input;
            }
            if let Some(output) = request.output {
                args.output = output;
            }
            run_blocking(move || {
                campsync_pipeline::run_prepare(&args).map(|outcome| {
                    serde_json::json!({
                        "stage": "prepare",
                        "success": true,
                        "outcome": outcome,
                    })
                })
            })
            .await?
        }
        "sync" => {
            let mut args = SyncArgs {
                dry_run: request.dry_run,
                ..Default::default()
            };
            if let Some(input) = request.input {
                args.input = input;
            }
            let report = run_blocking(move || campsync_pipeline::run_sync(&args)).await?;
            if report.has_errors() {
                return Err(ApiError::with_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({
                        "stage": "sync",
                        "success": false,
                        "report": report,
                    }),
                ));
            }
            serde_json::json!({
                "stage": "sync",
                "success": true,
                "report": report,
            })
        }
        _ => unreachable!(),
    };

    Ok(Json(result))
}

/// Run a blocking stage off the async runtime, bounded by the stage
/// timeout.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(STAGE_TIMEOUT, handle).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join)) => {
            warn!(error = %join, "stage task panicked");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "stage task failed".to_string(),
            ))
        }
        Err(_) => Err(ApiError::new(
            StatusCode::REQUEST_TIMEOUT,
            format!("stage timed out after {}s", STAGE_TIMEOUT.as_secs()),
        )),
    }
}

/// JSON error response: `{"error": "..."}` or a full stage report.
struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }),
        }
    }

    fn with_body(status: StatusCode, body: serde_json::Value) -> Self {
        Self { status, body }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match &e {
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
