use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::{api_error, check_keys, validation_error, ApiError};
use crate::{
    error::CoachError,
    models::{
        practice::{HistoryQuery, UpdateProfileRequest},
        CodeReviewRequest, VariationRequest,
    },
    services::AppState,
};

/// GET /api/v1/users/{user_id}/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    let profile = state
        .profiles
        .get(&user_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(CoachError::NotFound(format!("profile for user {}", user_id))))?;
    Ok(Json(profile))
}

/// PUT /api/v1/users/{user_id}/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    req.validate().map_err(validation_error)?;

    let profile = state
        .profiles
        .upsert(&user_id, req)
        .await
        .map_err(api_error)?;
    Ok(Json(profile))
}

/// POST /api/v1/users/{user_id}/problems/{problem_id}/variations
pub async fn generate_variations(
    State(state): State<Arc<AppState>>,
    Path((user_id, problem_id)): Path<(String, String)>,
    Json(req): Json<VariationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str()), ("problem_id", problem_id.as_str())])?;
    req.validate().map_err(validation_error)?;
    tracing::info!(user_id = %user_id, problem_id = %problem_id, count = req.count, "Generating problem variations");

    let record = state
        .practice
        .variations(&user_id, &problem_id, req)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/users/{user_id}/variations
pub async fn list_variations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    query.validate().map_err(validation_error)?;

    let records = state
        .practice
        .recent_variations(&user_id, query.limit)
        .await
        .map_err(api_error)?;
    Ok(Json(records))
}

/// POST /api/v1/users/{user_id}/code-reviews
pub async fn review_code(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<CodeReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    req.validate().map_err(validation_error)?;
    tracing::info!(user_id = %user_id, language = %req.language, problem_id = ?req.problem_id, "Reviewing code");

    let record = state
        .practice
        .review(&user_id, req)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/users/{user_id}/code-reviews
pub async fn list_code_reviews(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("user_id", user_id.as_str())])?;
    query.validate().map_err(validation_error)?;

    let records = state
        .practice
        .recent_reviews(&user_id, query.limit)
        .await
        .map_err(api_error)?;
    Ok(Json(records))
}
