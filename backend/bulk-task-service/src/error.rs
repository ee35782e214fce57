/// Error types for bulk-task-service
///
/// Every handler returns [`AppError`]; it renders as a JSON body with a
/// `detail` field, matching what the admin front-end already parses.
use crate::keys::KeyValidationError;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use cdn_bucket::BucketError;
use task_queue::QueueError;
use thiserror::Error;

/// Result type for bulk-task-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown, malformed or already finalized group id
    #[error("Notfound")]
    NotFound,

    /// Submission with an empty signature list
    #[error("No tasks to be done")]
    NothingToDo,

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Imported key list failed validation; nothing was saved
    #[error("Invalid key list")]
    InvalidKeys(Vec<KeyValidationError>),

    /// Object store failure, passed through unmodified
    #[error(transparent)]
    Storage(#[from] BucketError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::NothingToDo => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InvalidKeys(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Queue(_)
            | AppError::CacheError(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = match self {
            AppError::InvalidKeys(errors) => serde_json::json!({
                "detail": self.to_string(),
                "errors": errors,
            }),
            _ => serde_json::json!({ "detail": self.to_string() }),
        };

        HttpResponse::build(status).json(body)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
