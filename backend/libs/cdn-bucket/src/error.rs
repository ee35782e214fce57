//! Bucket error types

use thiserror::Error;

/// Which side of the mirror already holds a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Remote,
    Local,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Remote => f.write_str("bucket"),
            Side::Local => f.write_str("local mirror"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BucketError {
    #[error("File already exists in {side} and overwrite argument is false: {path}")]
    AlreadyExists { path: String, side: Side },

    #[error("Object not found in bucket: {0}")]
    NotFound(String),

    #[error("Remote storage error: {0}")]
    Remote(String),

    #[error("Local mirror I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl BucketError {
    pub(crate) fn remote(context: &str, err: impl std::fmt::Display) -> Self {
        BucketError::Remote(format!("{context}: {err}"))
    }

    /// Stable category name, used when a worker reports the failure
    pub fn kind(&self) -> &'static str {
        match self {
            BucketError::AlreadyExists { .. } => "AlreadyExists",
            BucketError::NotFound(_) => "NotFound",
            BucketError::Remote(_) => "StorageError",
            BucketError::Io(_) => "IOError",
            BucketError::Serialization(_) => "SerializationError",
            BucketError::InvalidPattern(_) => "InvalidPattern",
        }
    }

    /// Transient failures a task runner may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, BucketError::Remote(_))
    }
}

pub type BucketResult<T> = Result<T, BucketError>;
