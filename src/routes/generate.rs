use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::api::{GenerateStyleRequest, GenerateStyleResponse};
use crate::services::{generation::InlineImage, pipeline::PromptMode};

/// POST /api/generate-style: generate one styled image inline, bypassing
/// the queue.
pub async fn generate_style(
    State(state): State<AppState>,
    Json(req): Json<GenerateStyleRequest>,
) -> ApiResult<Json<GenerateStyleResponse>> {
    req.validate()
        .map_err(|_| ApiError::BadRequest("Image, prompt, and userId are required".to_string()))?;

    let bytes = STANDARD
        .decode(strip_data_url(&req.image).trim())
        .map_err(|_| ApiError::BadRequest("image is not valid base64".to_string()))?;
    let format = image::guess_format(&bytes)
        .map_err(|_| ApiError::BadRequest("image payload is not a supported image".to_string()))?;

    let pipeline = &state.pipeline;
    let balance = pipeline.ensure_credit(&req.user_id).await?;
    tracing::info!(user_id = %req.user_id, balance, "Processing synchronous style generation");

    let stamp = request_stamp();

    // Input copy is for history only
    if let Err(e) = pipeline
        .publisher()
        .publish_input(&req.user_id, &stamp, &bytes)
        .await
    {
        tracing::warn!(user_id = %req.user_id, error = %e, "Input image upload failed");
    }

    let input = InlineImage {
        bytes,
        mime_type: format.to_mime_type().to_string(),
    };
    let generated = pipeline
        .render(&req.prompt, PromptMode::Wrapped, std::slice::from_ref(&input))
        .await?;
    metrics::counter!("style_sync_generations_total").increment(1);

    let data = STANDARD.encode(&generated.bytes);

    let url = match pipeline
        .publisher()
        .publish_output(&req.user_id, &stamp, &generated.bytes)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(user_id = %req.user_id, error = %e, "Output image upload failed");
            return Ok(Json(GenerateStyleResponse {
                kind: "image".to_string(),
                url: None,
                data,
                description: "Image generated (inline copy, storage unavailable).".to_string(),
            }));
        }
    };

    let description = match pipeline.ledger().decrement(&req.user_id).await {
        Ok(remaining) => format!("Image generated. Remaining credits: {remaining}"),
        Err(e) => {
            tracing::error!(user_id = %req.user_id, error = %e, "Credit deduction failed");
            format!("Image generated but credit could not be deducted ({e})")
        }
    };

    Ok(Json(GenerateStyleResponse {
        kind: "image".to_string(),
        url: Some(url),
        data,
        description,
    }))
}

/// Drop a `data:image/...;base64,` prefix if present.
pub fn strip_data_url(image: &str) -> &str {
    match image.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        Some((_, payload)) => payload,
        None => image,
    }
}

/// `<millis>-<7 random hex chars>`, unique per synchronous request.
fn request_stamp() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..7])
}
