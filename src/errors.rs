// ABOUTME: Application error taxonomy and HTTP response conversion
// ABOUTME: Maps internal error kinds to the status codes required by the external interface
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// The error kinds specified for the cell service, with their propagation
/// policy already baked into `status_code()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing, expired, or invalid bearer token.
    Unauthenticated,
    /// Caller is authenticated but lacks the required permission level.
    Forbidden,
    /// Requested cell or item does not exist.
    NotFound,
    /// Duplicate user email or similar uniqueness violation.
    Conflict,
    /// Envelope failed to decrypt (bad tag, unknown algorithm, missing field).
    DecryptFailed,
    /// Malformed request body or unsupported operation.
    InvalidInput,
    /// A required subsystem (e.g. crypto) is disabled.
    Unavailable,
    /// Caller exceeded a rate limit.
    RateLimited,
    /// Storage or event-bus I/O failed after retries were exhausted.
    Transient,
}

impl ErrorCode {
    /// HTTP status this error kind is surfaced as.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict | Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::DecryptFailed | Self::Transient => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::DecryptFailed => "decrypt_failed",
            Self::InvalidInput => "invalid_input",
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
        }
    }
}

/// The crate-wide application error. Carries an [`ErrorCode`] plus a
/// human-readable message safe to return to the caller.
#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct AppError {
    /// Which taxonomy bucket this error falls in.
    pub code: ErrorCode,
    /// Message returned to the caller. Never includes internal details.
    pub message: String,
}

impl AppError {
    /// Build a new application error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 401 — missing/expired/invalid token.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    /// 403 — insufficient permission.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// 404 — unknown cell or item.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// 400 — duplicate resource.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// 500 — envelope failed to decrypt.
    #[must_use]
    pub fn decrypt_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DecryptFailed, message)
    }

    /// 400 — malformed body or unsupported operation.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// 503 — required subsystem disabled.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// 429 — rate limit exceeded.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimited, message)
    }

    /// 500 — storage/event-bus I/O exhausted its retries.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transient, message)
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorResponse {
            code: self.code.as_str(),
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("resource not found"),
            other => Self::transient(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_input(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::transient(err.to_string())
    }
}

/// Convenience alias for request-path results.
pub type AppResult<T> = Result<T, AppError>;
