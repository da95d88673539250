use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::error::CoachError;
use crate::metrics;
use crate::services::{store::MAX_KEY_BYTES, AppState};

pub mod practice;
pub mod problems;
pub mod progress;
pub mod sessions;

/// Error half of every handler result: a status and a JSON body of the form
/// `{ "error": kind, "message": text, "retryable": bool }`.
pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub fn status_for(error: &CoachError) -> StatusCode {
    match error {
        CoachError::NotFound(_) => StatusCode::NOT_FOUND,
        CoachError::SkipNotAllowed { .. }
        | CoachError::LadderExhausted { .. }
        | CoachError::AlreadyTerminal
        | CoachError::OutOfOrder { .. } => StatusCode::CONFLICT,
        CoachError::ConfirmationRequired { .. } => StatusCode::PRECONDITION_REQUIRED,
        CoachError::UnknownTopic(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoachError::InvalidLevel { .. } | CoachError::Validation(_) => StatusCode::BAD_REQUEST,
        CoachError::GenerationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoachError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn api_error(error: CoachError) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(kind = error.kind(), "Request failed: {}", error);
    } else {
        tracing::debug!(kind = error.kind(), "Request rejected: {}", error);
    }
    (
        status,
        Json(json!({
            "error": error.kind(),
            "message": error.to_string(),
            "retryable": error.is_retryable(),
        })),
    )
}

pub fn validation_error(errors: validator::ValidationErrors) -> ApiError {
    api_error(CoachError::Validation(errors.to_string()))
}

/// Ids from the path or body end up as storage keys, so they are bounded in
/// bytes rather than characters.
pub fn check_keys(keys: &[(&str, &str)]) -> Result<(), ApiError> {
    for (name, value) in keys {
        if value.is_empty() || value.len() > MAX_KEY_BYTES {
            return Err(api_error(CoachError::Validation(format!(
                "{} must be between 1 and {} bytes",
                name, MAX_KEY_BYTES
            ))));
        }
    }
    Ok(())
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "dsa-coach-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": {
                "storage": state.store.backend_name(),
                "generation": state.generator.name(),
            }
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}
