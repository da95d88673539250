use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use super::{api_error, check_keys, validation_error, ApiError};
use crate::{
    models::{attempt::SubmitAttemptRequest, mastery::UserExport},
    services::AppState,
};

/// POST /api/v1/users/{user_id}/attempts
pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;
    check_keys(&[("user_id", user_id.as_str()), ("problem_id", req.problem_id.as_str())])?;
    if let Some(attempt_id) = req.attempt_id.as_deref() {
        check_keys(&[("attempt_id", attempt_id)])?;
    }
    tracing::info!(
        user_id = %user_id,
        problem_id = %req.problem_id,
        correct = req.correct,
        "Submitting attempt"
    );

    let response = state
        .attempts
        .submit(&user_id, req)
        .await
        .map_err(api_error)?;

    let status = if response.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

/// GET /api/v1/users/{user_id}/progress
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    let progress = state.tracker.progress(&user_id).await.map_err(api_error)?;
    Ok(Json(progress))
}

/// GET /api/v1/users/{user_id}/mastery/{topic}
pub async fn get_mastery(
    State(state): State<Arc<AppState>>,
    Path((user_id, topic)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str()), ("topic", topic.as_str())])?;
    let record = state
        .tracker
        .record(&user_id, &topic)
        .await
        .map_err(api_error)?;
    Ok(Json(record))
}

/// POST /api/v1/users/{user_id}/mastery/rebuild
pub async fn rebuild_mastery(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    tracing::info!(user_id = %user_id, "Rebuilding mastery records");
    let outcome = state.tracker.rebuild(&user_id).await.map_err(api_error)?;
    Ok(Json(outcome))
}

/// GET /api/v1/users/{user_id}/export
pub async fn export_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    let profile = state.profiles.get(&user_id).await.map_err(api_error)?;
    let sessions = state
        .sessions
        .list_for_user(&user_id)
        .await
        .map_err(api_error)?;
    let mastery = state.tracker.export(&user_id).await.map_err(api_error)?;
    let code_reviews = state
        .practice
        .recent_reviews(&user_id, usize::MAX)
        .await
        .map_err(api_error)?;
    let variations = state
        .practice
        .recent_variations(&user_id, usize::MAX)
        .await
        .map_err(api_error)?;

    Ok(Json(UserExport {
        user_id,
        profile,
        sessions,
        mastery,
        code_reviews,
        variations,
        exported_at: Utc::now(),
    }))
}
