use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::{api_error, check_keys, validation_error, ApiError};
use crate::{models::RegisterProblemRequest, services::AppState};

/// POST /api/v1/problems
pub async fn register_problem(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterProblemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let (problem, created) = state.catalog.register(req).await.map_err(api_error)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(problem)))
}

/// GET /api/v1/problems/{problem_id}
pub async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_keys(&[("problem_id", problem_id.as_str())])?;
    let problem = state.catalog.get(&problem_id).await.map_err(api_error)?;
    Ok(Json(problem))
}
