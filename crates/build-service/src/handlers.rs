//! API handlers for the build service.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use forge_common::{BuildFailure, BuildOk, BuildRequest, Error};
use forge_pipeline::Orchestrator;

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn invalid_command() -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: Error::InvalidCommand.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(BuildFailure::from_message(self.message))).into_response()
    }
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "build-service"
    }))
}

/// Command envelope; the build fields live beside `action` in `payload`.
#[derive(Debug, Deserialize)]
pub struct CommandEnvelope {
    pub payload: serde_json::Value,
}

/// Run a build to completion and report the published package name.
pub async fn build_handler(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<CommandEnvelope>,
) -> Result<Json<BuildOk>, ApiError> {
    match envelope.payload.get("action").and_then(|a| a.as_str()) {
        Some("build") => {}
        _ => return Err(ApiError::invalid_command()),
    }

    let request: BuildRequest =
        serde_json::from_value(envelope.payload).map_err(|e| ApiError {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        })?;

    info!("Accepted build request: {}", request.request_id);

    match state.orchestrator.build(request).await {
        Ok(ok) => Ok(Json(ok)),
        Err(err) => Err(ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }),
    }
}
