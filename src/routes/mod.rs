use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod health;
pub mod jobs;
pub mod metrics;

/// Job and health routes. `/metrics` is mounted by the server binary, which
/// owns the global recorder.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/transcribe/upload", post(jobs::upload))
        .route("/transcribe/job/{job_id}", get(jobs::get_job_status))
        .route("/transcribe/jobs", get(jobs::list_jobs))
        .route("/audio/download/{job_id}", get(jobs::download_audio))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
