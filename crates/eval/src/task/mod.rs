//! Task executor capability.
//!
//! Task states that are not mocked delegate to a [`TaskExecutor`] injected
//! by the host. This crate ships only [`StaticTaskExecutor`], which answers
//! from canned per-resource results; real integrations live with the host.

pub mod static_executor;

pub use static_executor::StaticTaskExecutor;

use async_trait::async_trait;
use std::fmt;

use crate::types::TaskSpec;

// ──────────────────────────────────────────────
// TaskError
// ──────────────────────────────────────────────

/// Errors a task executor can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task ran and failed; reported to the caller unchanged.
    Failed { error: String, cause: String },
    /// The executor could not run the task at all (unreachable service,
    /// unknown resource). Reported as `States.TaskFailed`.
    Unavailable { resource: String, message: String },
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Failed { error, cause } => write!(f, "task failed: {}: {}", error, cause),
            TaskError::Unavailable { resource, message } => {
                write!(f, "executor unavailable for '{}': {}", resource, message)
            }
        }
    }
}

impl std::error::Error for TaskError {}

// ──────────────────────────────────────────────
// TaskExecutor trait
// ──────────────────────────────────────────────

/// Performs the real side effect of a Task state.
///
/// `input` is the task's effective input (after `InputPath` and
/// `Parameters`); the returned value is the raw result before
/// `ResultSelector`/`ResultPath`/`OutputPath` are applied.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        task: &TaskSpec,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, TaskError>;
}
