//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use devkit::error::DevkitError;
use serde_json::json;
use tracing::error;

const INTERNAL_MESSAGE: &str = "Internal server error";
const INTERNAL_KIND: &str = "InternalError";

#[derive(Debug)]
pub enum ApiError {
    Devkit(DevkitError),
    Unauthorized,
    RateLimited { rpm: u32 },
    /// A failure outside the devkit library, e.g. a panicked blocking task.
    Internal(String),
}

impl From<DevkitError> for ApiError {
    fn from(err: DevkitError) -> Self {
        Self::Devkit(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            Self::Devkit(err) => match err {
                DevkitError::Validation(ref message) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, message.clone(), err.kind())
                }
                DevkitError::NotFound(ref message) => {
                    (StatusCode::NOT_FOUND, message.clone(), err.kind())
                }
                DevkitError::LockTimeout { .. } => {
                    error!(error = %err, "state lock timed out");
                    (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), err.kind())
                }
                other => {
                    error!(error = %other, kind = other.kind(), "request failed");
                    internal()
                }
            },
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid API key".to_string(),
                "Unauthorized",
            ),
            Self::RateLimited { rpm } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Rate limit exceeded: {rpm} per 1 minute"),
                "RateLimitExceeded",
            ),
            Self::Internal(detail) => {
                error!(error = %detail, "request failed");
                internal()
            }
        };
        (status, Json(json!({ "error": message, "type": kind }))).into_response()
    }
}

fn internal() -> (StatusCode, String, &'static str) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE.to_string(),
        INTERNAL_KIND,
    )
}
