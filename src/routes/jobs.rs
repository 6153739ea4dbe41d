use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::api::{EnqueueJobRequest, OutcomeStatus, ProcessJobsResponse};
use crate::models::job::{NewJob, StyleJob};
use crate::models::style::{self, Style};

/// GET /api/styles: active built-in styles in display order.
pub async fn list_styles() -> Json<Vec<&'static Style>> {
    Json(style::active_styles())
}

/// POST /api/jobs: queue a styling request and nudge the scheduler.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(req): Json<EnqueueJobRequest>,
) -> ApiResult<(StatusCode, Json<StyleJob>)> {
    req.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let style = style::find_style(&req.style_id)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown style '{}'", req.style_id)))?;

    let photos = 1 + usize::from(req.input_image2_url.is_some());
    if photos != style.photo_count() {
        return Err(ApiError::BadRequest(format!(
            "style '{}' takes {} photo(s), got {}",
            style.id,
            style.photo_count(),
            photos
        )));
    }

    let job = state
        .jobs
        .enqueue(NewJob {
            user_id: req.user_id,
            style_id: style.id.to_string(),
            style_name: style.name.to_string(),
            prompt: style.prompt_modifier.to_string(),
            input_image_url: req.input_image_url,
            input_image2_url: req.input_image2_url,
        })
        .await?;

    state.wake.notify_one();

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/jobs/{job_id}: current state of a job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<StyleJob>> {
    state
        .jobs
        .get(job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))
}

/// POST /api/process-jobs: run one processor pass now and report on it.
pub async fn process_jobs(State(state): State<AppState>) -> ApiResult<Json<ProcessJobsResponse>> {
    let outcomes = state.processor.run_once().await?;

    if !outcomes.is_empty() {
        let failed = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .count();
        tracing::info!(processed = outcomes.len(), failed, "On-demand processor pass finished");
    }

    Ok(Json(ProcessJobsResponse::from_outcomes(outcomes)))
}
