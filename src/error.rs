use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::diff::DiffError;

#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Comparison failed: {0}")]
    Comparison(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Run failed: {0}")]
    RunFailure(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SentinelError>;

impl From<DiffError> for SentinelError {
    fn from(err: DiffError) -> Self {
        SentinelError::Comparison(err.to_string())
    }
}

impl IntoResponse for SentinelError {
    fn into_response(self) -> Response {
        let status = match &self {
            SentinelError::Configuration(_) => StatusCode::BAD_REQUEST,
            SentinelError::NotFound(_) => StatusCode::NOT_FOUND,
            SentinelError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SentinelError::Capture(_) => StatusCode::BAD_GATEWAY,
            SentinelError::Notification(_) => StatusCode::BAD_GATEWAY,
            SentinelError::Http(_) => StatusCode::BAD_GATEWAY,
            SentinelError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SentinelError::Comparison(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SentinelError::RunFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SentinelError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SentinelError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SentinelError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SentinelError::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
