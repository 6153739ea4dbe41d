use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::{job_store::StoreError, ledger::LedgerError, pipeline::ProcessError};

/// Error type for HTTP handlers, rendered as `{"error": ..., "details"?: ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, String, Option<String>) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            ApiError::Process(err) => match err {
                ProcessError::InsufficientCredit { .. }
                | ProcessError::Ledger(LedgerError::InsufficientCredit(_)) => (
                    StatusCode::FORBIDDEN,
                    "Insufficient credit, please top up".to_string(),
                    None,
                ),
                ProcessError::Ledger(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not load user profile".to_string(),
                    None,
                ),
                ProcessError::Refused { reason } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Model did not produce an image".to_string(),
                    Some(reason.clone()),
                ),
                ProcessError::EmptyResponse => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Model did not return a valid image".to_string(),
                    None,
                ),
                other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string(), None),
            },
            ApiError::Store(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = match details {
            Some(details) => json!({ "error": message, "details": details }),
            None => json!({ "error": message }),
        };

        (status, axum::Json(body)).into_response()
    }
}
