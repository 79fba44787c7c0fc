use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced by the crisis lifecycle operations.
#[derive(Debug, Error)]
pub enum CrisisError {
    /// Both the primary and the fallback classifier failed.
    #[error("Crisis detection failed: {0}")]
    DetectionFailure(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Alert not found: {0}")]
    NotFound(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// One channel or recipient failed; logged, never returned to callers.
    #[error("Notification failure: {0}")]
    Notification(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CrisisError {
    pub fn persistence<E: std::fmt::Display>(err: E) -> Self {
        CrisisError::Persistence(format!("{err:#}"))
    }
}

impl From<validator::ValidationErrors> for CrisisError {
    fn from(err: validator::ValidationErrors) -> Self {
        CrisisError::Validation(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Body parsing error: {0}")]
    BodyParsingError(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Helper for mapping any unknown error into internal error
pub fn internal_error<E: ToString>(err: E) -> AppError {
    AppError::InternalServerError(err.to_string())
}

impl From<CrisisError> for AppError {
    fn from(err: CrisisError) -> Self {
        let message = err.to_string();
        match err {
            CrisisError::NotFound(_) => AppError::NotFound(message),
            CrisisError::InvalidState(_) => AppError::Conflict(message),
            CrisisError::Validation(_) => AppError::BodyParsingError(message),
            CrisisError::DetectionFailure(_) => AppError::UpstreamError(message),
            CrisisError::Persistence(_) | CrisisError::Notification(_) => {
                AppError::InternalServerError(message)
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal_error(format!("{err:#}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BodyParsingError(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = Json(json!({
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}
