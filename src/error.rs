//! API error types
//!
//! Import failures carry their pipeline step and fetch diagnostics into the
//! response body so a caller can tell upstream denial from an internal
//! defect without reading server logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{ImportError, ImportErrorKind};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Import pipeline failure; status derives from the failure kind
    #[error(transparent)]
    Import(#[from] ImportError),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", &msg),
            ApiError::Internal(msg) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", &msg)
            }
            ApiError::Other(err) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                &err.to_string(),
            ),
            ApiError::Import(err) => import_response(err),
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message,
        }
    }));
    (status, body).into_response()
}

fn import_response(err: ImportError) -> Response {
    let (status, code) = match &err.kind {
        ImportErrorKind::MissingCredential => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        ImportErrorKind::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        ImportErrorKind::NoRows { .. } => (StatusCode::FORBIDDEN, "NO_IMPORTABLE_ROWS"),
        ImportErrorKind::Upstream(source) if source.is_permission() => {
            (StatusCode::FORBIDDEN, "UPSTREAM_FORBIDDEN")
        }
        ImportErrorKind::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
        ImportErrorKind::Index(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INDEX_ERROR"),
        ImportErrorKind::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    };

    let mut body = json!({
        "error": {
            "code": code,
            "message": err.kind.to_string(),
        },
        "step": err.step,
        "debug": err.debug,
    });
    if let ImportErrorKind::RateLimited {
        retry_after_seconds,
    } = &err.kind
    {
        body["retry_after_seconds"] = json!(retry_after_seconds);
    }

    (status, Json(body)).into_response()
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
