use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::CoachError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(middlewares::trace::TRACE_ID_HEADER),
        ])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1", api_routes())
        .with_state(app_state)
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/problems", post(handlers::problems::register_problem))
        .route("/problems/{problem_id}", get(handlers::problems::get_problem))
        .nest("/users/{user_id}", user_routes())
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/problems/{problem_id}/hints",
            post(handlers::sessions::request_hint),
        )
        .route(
            "/problems/{problem_id}/session",
            get(handlers::sessions::get_session),
        )
        .route(
            "/problems/{problem_id}/session/terminal",
            post(handlers::sessions::mark_terminal),
        )
        .route("/attempts", post(handlers::progress::submit_attempt))
        .route("/progress", get(handlers::progress::get_progress))
        .route("/mastery/rebuild", post(handlers::progress::rebuild_mastery))
        .route("/mastery/{topic}", get(handlers::progress::get_mastery))
        .route(
            "/problems/{problem_id}/variations",
            post(handlers::practice::generate_variations),
        )
        .route("/variations", get(handlers::practice::list_variations))
        .route(
            "/code-reviews",
            get(handlers::practice::list_code_reviews).post(handlers::practice::review_code),
        )
        .route(
            "/profile",
            get(handlers::practice::get_profile).put(handlers::practice::update_profile),
        )
        .route("/export", get(handlers::progress::export_user))
}
