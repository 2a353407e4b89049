//! Isolated state evaluator for declarative state machines.
//!
//! Given a full definition, a target state, an input document and a set of
//! mock configurations, the evaluator runs just that state (or the subgraph
//! rooted at it) and reports its output, or the error, cause and qualified
//! path of the state that failed together with partial results from
//! container branches that finished first.
//!
//! Pipeline for one call:
//! 1. Load and validate the definition
//! 2. Resolve the target state name
//! 3. Validate mock configurations into a registry
//! 4. Evaluate the state (or walk its subgraph)
//! 5. Assemble the result
//!
//! Steps 1-3 reject the request with a [`RequestError`]. Anything that goes
//! wrong in step 4 is reported as [`EvaluationResult::Failure`].

pub mod assemble;
pub mod branch;
pub mod choice;
pub mod config;
pub mod datapath;
pub mod mock;
pub mod request;
pub mod resolve;
pub mod task;
pub mod types;

use std::sync::Arc;

pub use assemble::{assemble, request_error_json, EvaluationResult};
pub use branch::StepRecord;
pub use config::EvalConfig;
pub use mock::{AppliedMocks, MockBinding, MockOutcome, MockRegistry};
pub use request::{EvaluationMode, EvaluationRequest, MockConfiguration, MockError};
pub use resolve::{resolve, ResolvedState};
pub use task::{StaticTaskExecutor, TaskError, TaskExecutor};
pub use types::{error_codes, PartialResult, RequestError, StateFailure, StateMachineDefinition};

use branch::Scope;

/// Entry point for evaluations.
///
/// Holds only configuration and the optional task executor; every call is
/// independent, so one evaluator may serve concurrent calls.
#[derive(Clone, Default)]
pub struct Evaluator {
    executor: Option<Arc<dyn TaskExecutor>>,
    config: EvalConfig,
}

impl Evaluator {
    /// An evaluator with default configuration and no task executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegate unmocked Task states to `executor`.
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate one request.
    ///
    /// Returns `Err` only when the request is rejected; state failures are
    /// `Ok(EvaluationResult::Failure { .. })`.
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult, RequestError> {
        let definition = StateMachineDefinition::load(&request.definition)?;
        let input = &request.input;
        let target = resolve(&definition, &request.state_name)?;
        let mocks = MockRegistry::register(&definition, request.bindings()?)?;

        tracing::debug!(
            state = %target.qualified_path,
            mode = ?request.mode,
            mocks = request.mock_configurations.len(),
            "evaluating request"
        );

        let scope = Scope {
            mocks: &mocks,
            executor: self.executor.as_deref(),
            config: &self.config,
            execution_input: input,
        };
        let mut applied = AppliedMocks::new();
        let outcome = match request.mode {
            EvaluationMode::State => {
                let mut segments = target.ancestors.clone();
                segments.push(target.node.name.clone());
                branch::run_single(&scope, target.node, segments, input.clone(), &mut applied).await
            }
            EvaluationMode::Subgraph => {
                branch::walk(
                    &scope,
                    target.graph,
                    &target.node.name,
                    &target.ancestors,
                    input.clone(),
                    false,
                    &mut applied,
                )
                .await
            }
        };

        match &outcome {
            Ok(walk) => tracing::info!(
                state = %target.qualified_path,
                steps = walk.steps.len(),
                mocks_applied = applied.names().len(),
                "evaluation succeeded"
            ),
            Err(failure) => tracing::info!(
                state = %target.qualified_path,
                error = %failure.error,
                caused_by = %failure.state_path,
                partial_results = failure.partial_results.len(),
                "evaluation failed"
            ),
        }

        Ok(assemble(outcome, applied, &request.state_name))
    }

    /// Evaluate a request given in wire form and return the wire response.
    ///
    /// Rejected requests produce the `INVALID_REQUEST` shape.
    pub async fn evaluate_json(&self, raw: &serde_json::Value) -> serde_json::Value {
        let result = match EvaluationRequest::from_json(raw) {
            Ok(request) => self.evaluate(&request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(result) => result.to_json(),
            Err(e) => {
                tracing::info!(error_type = e.error_type(), error = %e, "request rejected");
                request_error_json(&e)
            }
        }
    }
}

/// Evaluate `request` with default configuration and no task executor.
pub async fn evaluate(request: &EvaluationRequest) -> Result<EvaluationResult, RequestError> {
    Evaluator::new().evaluate(request).await
}

/// Evaluate a wire-form request with default configuration.
pub async fn evaluate_json(raw: &serde_json::Value) -> serde_json::Value {
    Evaluator::new().evaluate_json(raw).await
}
