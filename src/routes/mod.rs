use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod generate;
pub mod health;
pub mod jobs;
pub mod metrics;

/// Application routes, without the metrics endpoint or middleware layers.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health_check))
        .route("/api/styles", get(jobs::list_styles))
        .route("/api/generate-style", post(generate::generate_style))
        .route("/api/jobs", post(jobs::enqueue_job))
        .route("/api/jobs/{job_id}", get(jobs::get_job))
        .route("/api/process-jobs", post(jobs::process_jobs))
        .with_state(state)
}
