use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// Stable, machine-readable codes; clients match on these, never on messages
pub mod error_code {
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

// Every failure a caller of the task service can observe.
// Backend details are carried for logging only; the HTTP response for
// `TaskError::Backend` uses a generic message.
#[derive(Error, Debug)]
pub enum TaskError {
    // Missing or empty required input. HTTP 400.
    #[error("{0}")]
    Validation(String),

    // The referenced task id does not exist. HTTP 404.
    #[error("task {0} not found")]
    NotFound(i64),

    // Storage operation failed. HTTP 500.
    #[error("storage error: {0}")]
    Backend(String),
}

impl TaskError {
    pub fn error_code(&self) -> &'static str {
        match self {
            TaskError::Validation(_) => error_code::VALIDATION_FAILED,
            TaskError::NotFound(_) => error_code::NOT_FOUND,
            TaskError::Backend(_) => error_code::STORAGE_ERROR,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskError::Validation(_) => StatusCode::BAD_REQUEST,
            TaskError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for TaskError {
    fn from(err: rusqlite::Error) -> Self {
        TaskError::Backend(err.to_string())
    }
}

impl From<reqwest::Error> for TaskError {
    fn from(err: reqwest::Error) -> Self {
        TaskError::Backend(err.to_string())
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let message = match &self {
            TaskError::Backend(detail) => {
                tracing::error!(error = %detail, "storage failure while serving request");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };
        let body = serde_json::json!({
            "error": message,
            "code": self.error_code(),
        });
        (self.status_code(), axum::Json(body)).into_response()
    }
}

// Why a remote description request was not usable.
// Never leaves the generator: every variant ends in the rule-based fallback.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("remote returned no text")]
    Empty,
}
