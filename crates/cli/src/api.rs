//! Administrative HTTP endpoints
//!
//! All bodies are JSON. Mutating endpoints answer `{"success": true, ...}`
//! or `{"success": false, "error": "..."}`.

use crate::engine::EngineError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rendermon_core::{Error as CoreError, ProgressSnapshot, TotalFramesInput};
use serde::Deserialize;
use serde_json::{json, Value};

/// Error returned by handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Engine(EngineError::Core(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Core(core)) => match core {
                err if err.is_validation() => StatusCode::BAD_REQUEST,
                CoreError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Engine(EngineError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(EngineError::Task(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SetDirectoryRequest {
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTotalFramesRequest {
    #[serde(default)]
    pub total_frames: Option<TotalFramesInput>,
}

/// POST /api/set-directory
pub async fn set_directory(
    State(state): State<AppState>,
    payload: Result<Json<SetDirectoryRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let directory = req
        .directory
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or(CoreError::MissingDirectory)?;

    let resolved = state.engine.switch_target(directory).await?;

    Ok(Json(json!({
        "success": true,
        "directory": resolved.display().to_string(),
    })))
}

/// POST /api/reset-frames
pub async fn reset_frames(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let completed = state.engine.reset().await?;

    Ok(Json(json!({
        "success": true,
        "completedFrames": completed,
    })))
}

/// POST /api/set-total-frames
pub async fn set_total_frames(
    State(state): State<AppState>,
    payload: Result<Json<SetTotalFramesRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let input = req
        .total_frames
        .ok_or_else(|| ApiError::BadRequest("totalFrames is required".to_string()))?;

    let total = state.engine.set_total_frames(input, None).await?;

    Ok(Json(json!({
        "success": true,
        "totalFrames": total,
    })))
}

/// GET /api/server-info
pub async fn server_info(State(state): State<AppState>) -> Json<Value> {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    Json(json!({
        "cwd": cwd,
        "platform": platform_name(),
        "defaultWatchDir": state.default_watch_dir.display().to_string(),
    }))
}

/// GET /api/state
pub async fn current_state(State(state): State<AppState>) -> ApiResult<Json<ProgressSnapshot>> {
    Ok(Json(state.engine.snapshot().await?))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.engine.hub().connection_count(),
    }))
}

/// Platform identifier in the form viewers already understand
fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}
