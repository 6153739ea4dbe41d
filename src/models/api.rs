use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/generate-style`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateStyleRequest {
    /// Base64 image, optionally with a `data:image/...;base64,` prefix.
    #[garde(length(min = 1))]
    #[serde(default)]
    pub image: String,

    #[garde(length(min = 1))]
    #[serde(default)]
    pub prompt: String,

    #[garde(length(min = 1, max = 128))]
    #[serde(default)]
    pub user_id: String,
}

/// Successful synchronous generation. `url` is absent when the output
/// upload failed and the caller must fall back to `data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateStyleResponse {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub data: String,
    pub description: String,
}

/// Body of `POST /api/jobs`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJobRequest {
    #[garde(length(min = 1, max = 128))]
    #[serde(default)]
    pub user_id: String,

    #[garde(length(min = 1, max = 64))]
    #[serde(default)]
    pub style_id: String,

    #[garde(length(min = 1))]
    #[serde(default)]
    pub input_image_url: String,

    #[garde(length(min = 1))]
    #[serde(default)]
    pub input_image2_url: Option<String>,
}

/// Outcome of one job within a processor pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutcome {
    pub id: Uuid,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Response of `POST /api/process-jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessJobsResponse {
    pub message: String,
    pub processed: usize,
    pub results: Vec<JobOutcome>,
}

impl ProcessJobsResponse {
    pub fn from_outcomes(results: Vec<JobOutcome>) -> Self {
        let message = if results.is_empty() {
            "No pending jobs"
        } else {
            "Jobs processed"
        };
        Self {
            message: message.to_string(),
            processed: results.len(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_requires_all_fields() {
        let req: GenerateStyleRequest =
            serde_json::from_str(r#"{"image":"abc","prompt":"","userId":"u1"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: GenerateStyleRequest =
            serde_json::from_str(r#"{"image":"abc","prompt":"anime"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: GenerateStyleRequest =
            serde_json::from_str(r#"{"image":"abc","prompt":"anime","userId":"u1"}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn outcome_serializes_without_empty_error() {
        let body = ProcessJobsResponse::from_outcomes(vec![JobOutcome {
            id: Uuid::nil(),
            status: OutcomeStatus::Success,
            error: None,
        }]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["processed"], 1);
        assert_eq!(json["results"][0]["status"], "success");
        assert!(json["results"][0].get("error").is_none());
    }

    #[test]
    fn empty_pass_reports_no_pending_jobs() {
        let body = ProcessJobsResponse::from_outcomes(Vec::new());
        assert_eq!(body.message, "No pending jobs");
        assert_eq!(body.processed, 0);
    }
}
