use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::{api_error, check_keys, validation_error, ApiError};
use crate::{
    error::CoachError,
    models::hint::{MarkTerminalRequest, RequestHintRequest},
    services::AppState,
};

/// POST /api/v1/users/{user_id}/problems/{problem_id}/hints
pub async fn request_hint(
    State(state): State<Arc<AppState>>,
    Path((user_id, problem_id)): Path<(String, String)>,
    Json(req): Json<RequestHintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str()), ("problem_id", problem_id.as_str())])?;
    req.validate().map_err(validation_error)?;

    tracing::info!(
        user_id = %user_id,
        problem_id = %problem_id,
        level = ?req.level,
        confirm = req.confirm,
        "Requesting hint"
    );

    let problem = state.catalog.get(&problem_id).await.map_err(api_error)?;
    let response = state
        .ladder
        .request_hint(&problem, &user_id, &req)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::OK, Json(response)))
}

/// GET /api/v1/users/{user_id}/problems/{problem_id}/session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path((user_id, problem_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str()), ("problem_id", problem_id.as_str())])?;
    let session = state
        .sessions
        .get(&user_id, &problem_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(CoachError::NotFound(format!("session for problem {}", problem_id))))?;

    Ok(Json(session))
}

/// POST /api/v1/users/{user_id}/problems/{problem_id}/session/terminal
pub async fn mark_terminal(
    State(state): State<Arc<AppState>>,
    Path((user_id, problem_id)): Path<(String, String)>,
    Json(req): Json<MarkTerminalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str()), ("problem_id", problem_id.as_str())])?;
    tracing::info!(
        user_id = %user_id,
        problem_id = %problem_id,
        verdict = req.verdict.as_str(),
        "Marking session terminal"
    );

    let session = state
        .sessions
        .mark_terminal(&user_id, &problem_id, req.verdict)
        .await
        .map_err(api_error)?;

    Ok(Json(session))
}
