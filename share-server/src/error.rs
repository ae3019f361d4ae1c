//! HTTP error responses
//!
//! Every failure leaves the server as `{"error": {"code", "message"}}` with a
//! status derived from the library error category.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use libsharecast::{PlatformError, SharecastError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request or content that failed validation (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing user identity or rejected credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A vendor call outside the share path failed (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Upstream(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.message(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<SharecastError> for ApiError {
    fn from(err: SharecastError) -> Self {
        if err.is_validation() {
            return ApiError::BadRequest(err.to_string());
        }
        if err.is_authentication() {
            return ApiError::Unauthorized(err.to_string());
        }
        match err {
            SharecastError::Platform(_) => ApiError::Upstream(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let message = format!("Invalid multipart form: {}", err.body_text());
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(message)
        } else {
            ApiError::BadRequest(message)
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
