//! Tasks executed by `bulk-task-worker`.
//!
//! | name                    | args                  | effect                          |
//! |-------------------------|-----------------------|---------------------------------|
//! | `bucket.push_file`      | `[path, overwrite]`   | [`Bucket::push`]                |
//! | `bucket.pull_file`      | `[path, overwrite]`   | [`Bucket::pull`]                |
//! | `tools.async_exception` | `[message]`           | always fails with `RuntimeError`|

use async_trait::async_trait;
use cdn_bucket::{Bucket, BucketError};
use serde_json::{json, Value};
use std::sync::Arc;
use task_queue::registry::{arg_bool, arg_str};
use task_queue::{TaskFailure, TaskHandler, TaskRegistry, TaskSignature};
use tracing::debug;

pub const PUSH_FILE_TASK: &str = "bucket.push_file";
pub const PULL_FILE_TASK: &str = "bucket.pull_file";
pub const ASYNC_EXCEPTION_TASK: &str = "tools.async_exception";

/// Failure kind raised by the placeholder task
pub const RUNTIME_ERROR: &str = "RuntimeError";

pub fn push_file_signature(path: &str, overwrite: bool) -> TaskSignature {
    TaskSignature::immutable(PUSH_FILE_TASK, vec![json!(path), json!(overwrite)])
}

pub fn pull_file_signature(path: &str, overwrite: bool) -> TaskSignature {
    TaskSignature::immutable(PULL_FILE_TASK, vec![json!(path), json!(overwrite)])
}

/// Stand-in for a unit that could not be built; fails remotely with `message`
pub fn async_exception_signature(message: impl Into<String>) -> TaskSignature {
    TaskSignature::immutable(ASYNC_EXCEPTION_TASK, vec![Value::String(message.into())])
}

/// Every task the worker knows how to run
pub fn registry(bucket: Bucket) -> TaskRegistry {
    TaskRegistry::new()
        .register(PUSH_FILE_TASK, Arc::new(PushFile(bucket.clone())))
        .register(PULL_FILE_TASK, Arc::new(PullFile(bucket)))
        .register(ASYNC_EXCEPTION_TASK, Arc::new(AsyncException))
}

fn bucket_failure(err: BucketError) -> TaskFailure {
    let failure = TaskFailure::new(err.kind(), err.to_string());
    if err.is_transient() {
        failure.retryable()
    } else {
        failure
    }
}

struct PushFile(Bucket);

#[async_trait]
impl TaskHandler for PushFile {
    async fn run(&self, args: &[Value]) -> Result<Value, TaskFailure> {
        let path = arg_str(args, 0)?;
        let overwrite = arg_bool(args, 1)?;
        self.0.push(path, overwrite).await.map_err(bucket_failure)?;
        debug!(path = %path, "push_file done");
        Ok(Value::Null)
    }
}

struct PullFile(Bucket);

#[async_trait]
impl TaskHandler for PullFile {
    async fn run(&self, args: &[Value]) -> Result<Value, TaskFailure> {
        let path = arg_str(args, 0)?;
        let overwrite = arg_bool(args, 1)?;
        self.0.pull(path, overwrite).await.map_err(bucket_failure)?;
        debug!(path = %path, "pull_file done");
        Ok(Value::Null)
    }
}

struct AsyncException;

#[async_trait]
impl TaskHandler for AsyncException {
    async fn run(&self, args: &[Value]) -> Result<Value, TaskFailure> {
        let message = arg_str(args, 0)?;
        Err(TaskFailure::new(RUNTIME_ERROR, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdn_bucket::MemoryBackend;
    use chrono::Utc;

    fn bucket(dir: &tempfile::TempDir) -> (Arc<MemoryBackend>, Bucket) {
        let backend = Arc::new(MemoryBackend::new());
        let bucket = Bucket::new(backend.clone(), dir.path()).unwrap();
        (backend, bucket)
    }

    #[tokio::test]
    async fn test_async_exception_always_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (_, bucket) = bucket(&dir);
        let sig = async_exception_signature("disk full");

        let err = registry(bucket).dispatch(&sig.task, &sig.args).await.unwrap_err();
        assert_eq!(err.kind, "RuntimeError");
        assert_eq!(err.message, "disk full");
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_push_file_task() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, bucket) = bucket(&dir);
        std::fs::write(dir.path().join("messages.json"), b"[]").unwrap();
        let sig = push_file_signature("messages.json", true);

        let value = registry(bucket).dispatch(&sig.task, &sig.args).await.unwrap();
        assert_eq!(value, Value::Null);
        assert_eq!(backend.object("messages.json").as_deref(), Some(&b"[]"[..]));
        assert!(backend.is_public("messages.json"));
    }

    #[tokio::test]
    async fn test_push_file_existing_key_is_not_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, bucket) = bucket(&dir);
        backend.insert_object("messages.json", b"old", Utc::now());
        std::fs::write(dir.path().join("messages.json"), b"new").unwrap();
        let sig = push_file_signature("messages.json", false);

        let err = registry(bucket).dispatch(&sig.task, &sig.args).await.unwrap_err();
        assert_eq!(err.kind, "AlreadyExists");
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_storage_failure_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, bucket) = bucket(&dir);
        backend.set_fail_writes(true);
        std::fs::write(dir.path().join("a.json"), b"{}").unwrap();
        let sig = push_file_signature("a.json", true);

        let err = registry(bucket).dispatch(&sig.task, &sig.args).await.unwrap_err();
        assert_eq!(err.kind, "StorageError");
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn test_pull_file_task() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, bucket) = bucket(&dir);
        backend.insert_object("img/maps/tehran.png", b"png", Utc::now());
        let sig = pull_file_signature("img/maps/tehran.png", true);

        registry(bucket).dispatch(&sig.task, &sig.args).await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("img/maps/tehran.png")).unwrap(),
            b"png"
        );
    }
}
