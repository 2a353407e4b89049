//! Definition model and error types for the statecheck evaluator.
//!
//! These types are DISTINCT from statecheck-interchange types. The evaluator
//! consumes the shallow interchange structs and deep-parses them into the
//! semantic tree defined here.

pub mod choice;
pub mod definition;

use serde::Serialize;

pub use choice::{ChoiceBranch, ChoiceRule, CompareOp, Operand, TypeTest, ValueKind};
pub use definition::{
    CatchDecl, FailSpec, IoSpec, MapSpec, StateEntry, StateGraph, StateKind,
    StateMachineDefinition, StateNode, TaskSpec, WaitSpec,
};

// ──────────────────────────────────────────────
// Request validation errors
// ──────────────────────────────────────────────

/// Errors that reject a request before any state is evaluated.
///
/// These are client-caused and carry no partial result. Everything that
/// goes wrong *during* evaluation is a [`StateFailure`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The request envelope itself could not be read.
    #[error("malformed request: {message}")]
    MalformedRequest { message: String },

    /// The definition failed structural validation.
    #[error("malformed definition: {message}")]
    MalformedDefinition { message: String },

    /// No state with this qualified or bare name exists.
    #[error("state not found: {name}")]
    StateNotFound { name: String },

    /// A bare name matched states in more than one container.
    #[error("state name '{name}' is ambiguous, candidates: {}", .candidates.join(", "))]
    AmbiguousStateName {
        name: String,
        candidates: Vec<String>,
    },

    /// A mock configuration is unusable against this definition.
    #[error("invalid mock configuration for '{state_name}': {message}")]
    InvalidMockConfiguration { state_name: String, message: String },
}

impl RequestError {
    /// Stable identifier used in serialized responses.
    pub fn error_type(&self) -> &'static str {
        match self {
            RequestError::MalformedRequest { .. } => "MalformedRequest",
            RequestError::MalformedDefinition { .. } => "MalformedDefinition",
            RequestError::StateNotFound { .. } => "StateNotFound",
            RequestError::AmbiguousStateName { .. } => "AmbiguousStateName",
            RequestError::InvalidMockConfiguration { .. } => "InvalidMockConfiguration",
        }
    }
}

impl From<statecheck_interchange::InterchangeError> for RequestError {
    fn from(err: statecheck_interchange::InterchangeError) -> Self {
        RequestError::MalformedDefinition {
            message: err.to_string(),
        }
    }
}

// ──────────────────────────────────────────────
// State-machine domain failures
// ──────────────────────────────────────────────

/// Reserved error codes raised by the evaluator itself.
pub mod error_codes {
    /// The task executor could not be reached or none is configured.
    pub const TASK_FAILED: &str = "States.TaskFailed";
    /// A task did not finish within its timeout.
    pub const TIMEOUT: &str = "States.Timeout";
    /// Data-path or structural problems discovered while evaluating.
    pub const RUNTIME: &str = "States.Runtime";
    /// A Choice state matched no rule and declares no `Default`.
    pub const NO_CHOICE_MATCHED: &str = "States.NoChoiceMatched";
}

/// Output of one branch or iteration that completed before its container
/// was aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialResult {
    /// Qualified path of the Map or Parallel state that owned the branch.
    pub container: String,
    /// Branch `StartAt` name for Parallel, item index for Map.
    pub branch: String,
    pub output: serde_json::Value,
}

/// A failure produced by evaluating a state.
///
/// `state_path` is the dotted qualified path of the state that originated
/// the failure. Containers append to `partial_results` while the failure
/// propagates but never rewrite `state_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateFailure {
    pub error: String,
    pub cause: String,
    pub state_path: String,
    pub partial_results: Vec<PartialResult>,
}

impl StateFailure {
    pub fn new(
        error: impl Into<String>,
        cause: impl Into<String>,
        state_path: impl Into<String>,
    ) -> Self {
        StateFailure {
            error: error.into(),
            cause: cause.into(),
            state_path: state_path.into(),
            partial_results: Vec::new(),
        }
    }

    /// Shorthand for an evaluator-raised `States.Runtime` failure.
    pub fn runtime(cause: impl Into<String>, state_path: impl Into<String>) -> Self {
        StateFailure::new(error_codes::RUNTIME, cause, state_path)
    }
}
