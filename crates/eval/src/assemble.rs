//! Result assembly.
//!
//! Turns the outcome of a walk plus the applied-mock record into the
//! response a caller sees:
//! - success: output, inspected state, the matched `Next` (if a single state
//!   was run), applied mock names in first-use order and the subset applied
//!   inside Map iterations
//! - failure: error, cause, the qualified path of the originating state and
//!   partial results, deepest container first

use serde::Serialize;
use serde_json::{json, Value};

use crate::branch::{StepRecord, WalkResult};
use crate::mock::AppliedMocks;
use crate::types::{PartialResult, RequestError, StateFailure};

/// Outcome of one evaluation call for a valid request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all_fields = "camelCase")]
pub enum EvaluationResult {
    #[serde(rename = "SUCCEEDED")]
    Success {
        output: Value,
        inspected_state_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_state: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        applied_mock_names: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        map_mocks_applied: Vec<String>,
        /// States visited, in order. Not part of the wire form.
        #[serde(skip)]
        steps: Vec<StepRecord>,
    },
    #[serde(rename = "FAILED")]
    Failure {
        error: String,
        cause: String,
        error_caused_by_state: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        partial_results: Vec<PartialResult>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        applied_mock_names: Vec<String>,
    },
}

impl EvaluationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationResult::Success { .. })
    }

    /// The wire form of this result.
    pub fn to_json(&self) -> Value {
        // Only strings and JSON values inside; serialization cannot fail.
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Build the caller-facing result.
pub fn assemble(
    outcome: Result<WalkResult, StateFailure>,
    applied: AppliedMocks,
    inspected_state_name: &str,
) -> EvaluationResult {
    match outcome {
        Ok(walk) => EvaluationResult::Success {
            output: walk.output,
            inspected_state_name: inspected_state_name.to_string(),
            next_state: walk.next_state,
            applied_mock_names: applied.names().to_vec(),
            map_mocks_applied: applied.map_names().to_vec(),
            steps: walk.steps,
        },
        Err(failure) => EvaluationResult::Failure {
            error: failure.error,
            cause: failure.cause,
            error_caused_by_state: failure.state_path,
            partial_results: failure.partial_results,
            applied_mock_names: applied.names().to_vec(),
        },
    }
}

/// The wire form of a rejected request.
pub fn request_error_json(err: &RequestError) -> Value {
    json!({
        "status": "INVALID_REQUEST",
        "errorType": err.error_type(),
        "message": err.to_string(),
    })
}
