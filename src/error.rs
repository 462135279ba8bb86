use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use crate::types::Source;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{origin} responded with HTTP {status}")]
    Upstream { origin: Source, status: u16 },

    #[error("{0} rate limit exceeded")]
    RateLimited(Source),

    #[error("{0} request timed out")]
    Timeout(Source),

    #[error("Unexpected {origin} payload: {detail}")]
    Payload { origin: Source, detail: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// True for failures that a fallback chain should absorb by moving on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Http(_)
                | AppError::Upstream { .. }
                | AppError::RateLimited(_)
                | AppError::Timeout(_)
                | AppError::Payload { .. }
                | AppError::Json(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream { .. } | AppError::RateLimited(_) | AppError::Payload { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
