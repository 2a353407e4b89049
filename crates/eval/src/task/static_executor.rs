//! Static task executor: canned results keyed by resource.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{TaskError, TaskExecutor};
use crate::types::TaskSpec;

/// Answers each resource with a fixed result.
///
/// Lookup order:
/// 1. an exact `Resource` match registered with `with_output`/`with_failure`
/// 2. the echo fallback, if enabled (returns the task input unchanged)
/// 3. otherwise `TaskError::Unavailable`
#[derive(Debug, Clone, Default)]
pub struct StaticTaskExecutor {
    results: HashMap<String, Result<serde_json::Value, TaskError>>,
    echo_unknown: bool,
}

impl StaticTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `resource` with `output`.
    pub fn with_output(mut self, resource: &str, output: serde_json::Value) -> Self {
        self.results.insert(resource.to_string(), Ok(output));
        self
    }

    /// Fail `resource` with the given error and cause.
    pub fn with_failure(mut self, resource: &str, error: &str, cause: &str) -> Self {
        self.results.insert(
            resource.to_string(),
            Err(TaskError::Failed {
                error: error.to_string(),
                cause: cause.to_string(),
            }),
        );
        self
    }

    /// Echo the input back for resources without a registered result.
    pub fn echo_unknown(mut self) -> Self {
        self.echo_unknown = true;
        self
    }
}

#[async_trait]
impl TaskExecutor for StaticTaskExecutor {
    async fn execute(
        &self,
        task: &TaskSpec,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
        if let Some(result) = self.results.get(&task.resource) {
            return result.clone();
        }
        if self.echo_unknown {
            return Ok(input.clone());
        }
        Err(TaskError::Unavailable {
            resource: task.resource.clone(),
            message: "no static result registered".to_string(),
        })
    }
}
