//! Error types for the ingestion queue

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion queue errors
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown task id or missing file
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected input (bad concurrency value, malformed reorder list)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the task's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Text extraction failed for a file
    #[error("Extraction failed for '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// Task store could not be read or written
    #[error("Task store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::InvalidState(_) => "invalid_state",
            Error::Extraction { .. } => "extraction_error",
            Error::Store(_) => "store_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Internal(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidArgument(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Store(_) | Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::invalid_argument("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::invalid_state("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::store("disk full").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_extraction_message() {
        let err = Error::extraction("a.pdf", "no text");
        assert_eq!(err.to_string(), "Extraction failed for 'a.pdf': no text");
        assert_eq!(err.kind(), "extraction_error");
    }
}
