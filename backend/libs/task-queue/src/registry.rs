//! Name → handler lookup used by workers.

use crate::TaskFailure;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Failure kind for a task name no handler is registered under
pub const NOT_REGISTERED: &str = "NotRegistered";
/// Failure kind for arguments that do not match the handler's signature
pub const INVALID_ARGUMENTS: &str = "InvalidArguments";

/// A registered unit of work.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, args: &[Value]) -> Result<Value, TaskFailure>;
}

#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run `name` with `args`; unknown names fail instead of panicking
    pub async fn dispatch(&self, name: &str, args: &[Value]) -> Result<Value, TaskFailure> {
        match self.get(name) {
            Some(handler) => handler.run(args).await,
            None => Err(TaskFailure::new(
                NOT_REGISTERED,
                format!("Received unregistered task of type '{name}'"),
            )),
        }
    }
}

/// Positional string argument
pub fn arg_str(args: &[Value], index: usize) -> Result<&str, TaskFailure> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        TaskFailure::new(
            INVALID_ARGUMENTS,
            format!("argument {index} must be a string"),
        )
    })
}

/// Positional boolean argument; absent means `false`
pub fn arg_bool(args: &[Value], index: usize) -> Result<bool, TaskFailure> {
    match args.get(index) {
        None => Ok(false),
        Some(value) => value.as_bool().ok_or_else(|| {
            TaskFailure::new(
                INVALID_ARGUMENTS,
                format!("argument {index} must be a boolean"),
            )
        }),
    }
}
