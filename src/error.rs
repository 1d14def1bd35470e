//! Crate-wide error kinds.
//!
//! Every domain operation in this crate returns `Result<_, CoreError>`.
//! `InvariantViolation` is the one kind that should never be constructed by
//! a guard check — it signals that an aggregate detected a state that
//! should be impossible, and callers must let it propagate rather than
//! recover from it (spec §7).

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::rate_limit::ThreatLevel;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited, retry after {retry_after_secs}s (threat: {threat_level:?})")]
    RateLimited {
        retry_after_secs: u64,
        threat_level: ThreatLevel,
    },

    #[error("insufficient balance: {0}")]
    Insufficient(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("unavailable: {message}")]
    Unavailable {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Maps domain errors onto HTTP responses. The rate-limited shape matches
/// spec §6's deny body exactly: `{"success":false,"error":...,"code":
/// "RATE_LIMIT_EXCEEDED","retry_after":<seconds>}`.
impl IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CoreError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            CoreError::InvariantViolation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVARIANT_VIOLATION"),
            CoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            CoreError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            CoreError::Insufficient(_) => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_BALANCE"),
            CoreError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            CoreError::Unavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        let retry_after = match &self {
            CoreError::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            CoreError::Unavailable { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        };

        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "code": code,
        });
        if let Some(retry_after) = retry_after {
            body["retry_after"] = json!(retry_after);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = retry_after {
            if let Ok(header_value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("retry-after", header_value);
            }
        }
        response
    }
}
