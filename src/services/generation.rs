use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::fetcher::truncate;

/// Refusal text kept for diagnostics.
const REFUSAL_PREVIEW_CHARS: usize = 100;

/// An image handed to the model.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// What the model produced, decoded once at the client boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    /// First image part of the first candidate.
    Image { bytes: Vec<u8>, mime_type: String },
    /// Safety stop, any other non-STOP finish, or a text-only reply.
    Refused { reason: String },
    /// No candidates, or a candidate without content parts.
    Empty,
}

/// Generates a styled image from a prompt and one or two input photos.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<GenerationResult, GenerationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("expected one or two input images, got {0}")]
    InvalidImageCount(usize),

    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    Text(&'a str),
    InlineData(Blob),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<Blob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<GenerationResult, GenerationError> {
        if !(1..=2).contains(&images.len()) {
            return Err(GenerationError::InvalidImageCount(images.len()));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let b64 = base64::engine::general_purpose::STANDARD;
        let mut parts = vec![RequestPart::Text(prompt)];
        parts.extend(images.iter().map(|img| {
            RequestPart::InlineData(Blob {
                mime_type: img.mime_type.clone(),
                data: b64.encode(&img.bytes),
            })
        }));

        let request_body = GenerateContentRequest {
            contents: vec![RequestContent { role: "user", parts }],
            generation_config: GenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
            },
        };

        let start = std::time::Instant::now();
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let body = response.text().await?;
        metrics::histogram!("style_generation_seconds").record(start.elapsed().as_secs_f64());

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        decode_response(parsed)
    }
}

fn decode_response(response: GenerateContentResponse) -> Result<GenerationResult, GenerationError> {
    let block_reason = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone());

    let Some(candidate) = response.candidates.into_iter().next() else {
        tracing::warn!(block_reason = ?block_reason, "Generation returned no candidates");
        return Ok(match block_reason {
            Some(reason) => GenerationResult::Refused {
                reason: format!("prompt blocked ({reason})"),
            },
            None => GenerationResult::Empty,
        });
    };

    let finish_reason = candidate.finish_reason;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    if let Some(blob) = parts
        .iter()
        .filter_map(|p| p.inline_data.as_ref())
        .find(|b| b.mime_type.starts_with("image/"))
    {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&blob.data)
            .map_err(|e| GenerationError::Malformed(format!("image part is not base64: {e}")))?;
        return Ok(GenerationResult::Image {
            bytes,
            mime_type: blob.mime_type.clone(),
        });
    }

    tracing::warn!(
        finish_reason = ?finish_reason,
        block_reason = ?block_reason,
        parts = parts.len(),
        "Generation returned no image"
    );

    if let Some(reason) = finish_reason.filter(|r| r != "STOP") {
        return Ok(GenerationResult::Refused {
            reason: format!("finish reason {reason}"),
        });
    }

    let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if !text.trim().is_empty() {
        return Ok(GenerationResult::Refused {
            reason: format!(
                "model replied with text: {}",
                truncate(text.trim(), REFUSAL_PREVIEW_CHARS)
            ),
        });
    }

    Ok(GenerationResult::Empty)
}
