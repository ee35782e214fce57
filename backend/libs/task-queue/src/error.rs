//! Error types for the task queue library.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by the broker itself, never by the tasks it runs.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Broker round-trip failed
    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// Stored envelope or record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A group must contain at least one signature
    #[error("Cannot enqueue an empty task group")]
    EmptyGroup,
}
