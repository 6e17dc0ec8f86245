// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.
//!
//! Rejections carry enough structured detail (remaining attempts, required
//! action) for the presentation layer to render actionable guidance. Storage
//! failures map to 503 so callers retry instead of reading them as empty data.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("No valid payment or subscription for {month_key}")]
    AccessDenied { month_key: String },

    #[error("Daily attempt quota exhausted ({games_today} used)")]
    QuotaExceeded { games_today: u32 },

    #[error("Invalid score: {0}")]
    InvalidScore(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Attempts left today, present on quota rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u32>,
    /// What the player must do to proceed
    #[serde(skip_serializing_if = "Option::is_none")]
    required_action: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details, remaining, required_action) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None, None, None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None, None, None),
            AppError::AccessDenied { month_key } => (
                StatusCode::PAYMENT_REQUIRED,
                "access_denied",
                Some(format!(
                    "no completed payment or active subscription for {month_key}"
                )),
                None,
                Some("pay_entry_fee"),
            ),
            AppError::QuotaExceeded { games_today } => (
                StatusCode::TOO_MANY_REQUESTS,
                "quota_exceeded",
                Some(format!("{games_today} attempts used today")),
                Some(0),
                Some("retry_tomorrow"),
            ),
            AppError::InvalidScore(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_score",
                Some(msg.clone()),
                None,
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "not_found",
                Some(msg.clone()),
                None,
                None,
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                Some(msg.clone()),
                None,
                None,
            ),
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                // Retryable: never presented as "no data".
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage_unavailable",
                    None,
                    None,
                    Some("retry"),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    None,
                    None,
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            remaining,
            required_action,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
