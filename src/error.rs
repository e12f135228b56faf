use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Application-wide error types.
///
/// # Transport Status Policy
///
/// Authentication failures and server-side failures are reported with a
/// `200 OK` transport status; the error semantics live in the `code` field of
/// the JSON body. Callers written against the gateway only ever inspect the
/// body. Access-denied and host-harness errors (`NotFound`, `BadGateway`)
/// keep their natural HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Access denied")]
    Forbidden,

    #[error("Store lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("No route for path: {0}")]
    NotFound(String),

    #[error("Upstream request failed: {0}")]
    BadGateway(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Uniform error body returned to callers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ErrorResponse {
    fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl AppError {
    /// Transport status and body for this error.
    fn parts(&self) -> (StatusCode, ErrorResponse) {
        match self {
            AppError::Unauthenticated(msg) => (
                StatusCode::OK,
                ErrorResponse::new(StatusCode::UNAUTHORIZED, msg.as_str()),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorResponse::new(StatusCode::FORBIDDEN, "Access denied"),
            ),
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(StatusCode::NOT_FOUND, "No route matches the request"),
            ),
            AppError::BadGateway(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new(
                    StatusCode::BAD_GATEWAY,
                    "Upstream service is unavailable. Please try again later.",
                ),
            ),
            // Server-side failures never leak store or body details to clients
            AppError::Store(_)
            | AppError::BodyRead(_)
            | AppError::Internal(_)
            | AppError::ConfigError(_) => (
                StatusCode::OK,
                ErrorResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred. Please contact support if the issue persists.",
                ),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthenticated(_) | AppError::Forbidden | AppError::NotFound(_) => {
                tracing::warn!(error = %self, "Request rejected");
            }
            _ => tracing::error!(error = %self, "Request failed"),
        }

        let (status, body) = self.parts();
        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
