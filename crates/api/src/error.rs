use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use masset_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Only admission timeouts and genuinely unrecoverable conditions reach this
/// type; expected pipeline failures are answered inside the pipeline itself.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `masset_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A required dependency was not configured at startup.
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::QueueTimeout(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVER_BUSY", core.to_string())
                }
                CoreError::PoolExhausted(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "POOL_EXHAUSTED", core.to_string())
                }
                CoreError::Config(msg) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", msg.clone())
                }
                other => {
                    tracing::error!(error = %other, "Unhandled core error reached the HTTP layer");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotInitialized(component) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_INITIALIZED",
                format!("{component} is not initialized"),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
