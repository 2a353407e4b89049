//! Evaluation requests and their wire form.
//!
//! The wire shape is camelCase JSON. On the wire, `definition`, `input` and
//! `mockOutput` may each be given either as a JSON document or as a string
//! holding the serialized document; [`EvaluationRequest::from_json`] decodes
//! such strings. Values built through the Rust API are taken as given.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mock::{MockBinding, MockOutcome};
use crate::types::RequestError;

/// How much of the machine to run from the target state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Evaluate the target state only.
    #[default]
    State,
    /// Follow `Next` links inside the target's graph until a state with no
    /// successor completes.
    Subgraph,
}

/// Replacement error carried by a mock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockError {
    pub error: String,
    #[serde(default)]
    pub cause: String,
}

/// One caller-supplied mock, as received on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockConfiguration {
    pub state_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_error: Option<MockError>,
}

impl MockConfiguration {
    pub fn output(state_name: &str, output: Value) -> Self {
        MockConfiguration {
            state_name: state_name.to_string(),
            mock_output: Some(output),
            mock_error: None,
        }
    }

    pub fn error(state_name: &str, error: &str, cause: &str) -> Self {
        MockConfiguration {
            state_name: state_name.to_string(),
            mock_output: None,
            mock_error: Some(MockError {
                error: error.to_string(),
                cause: cause.to_string(),
            }),
        }
    }

    /// Convert into a registry binding. Exactly one of `mockOutput` and
    /// `mockError` must be present.
    pub fn to_binding(&self) -> Result<MockBinding, RequestError> {
        let invalid = |message: &str| RequestError::InvalidMockConfiguration {
            state_name: self.state_name.clone(),
            message: message.to_string(),
        };
        let outcome = match (&self.mock_output, &self.mock_error) {
            (Some(output), None) => MockOutcome::Output(output.clone()),
            (None, Some(e)) => MockOutcome::Failure {
                error: e.error.clone(),
                cause: e.cause.clone(),
            },
            (Some(_), Some(_)) => return Err(invalid("mockOutput and mockError are mutually exclusive")),
            (None, None) => return Err(invalid("one of mockOutput or mockError is required")),
        };
        Ok(MockBinding {
            state_name: self.state_name.clone(),
            outcome,
        })
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Everything one evaluation needs. The evaluator only borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub definition: Value,
    #[serde(default = "empty_object")]
    pub input: Value,
    pub state_name: String,
    #[serde(default)]
    pub mock_configurations: Vec<MockConfiguration>,
    #[serde(default)]
    pub mode: EvaluationMode,
}

impl EvaluationRequest {
    pub fn new(definition: Value, input: Value, state_name: &str) -> Self {
        EvaluationRequest {
            definition,
            input,
            state_name: state_name.to_string(),
            mock_configurations: Vec::new(),
            mode: EvaluationMode::State,
        }
    }

    pub fn with_mock(mut self, mock: MockConfiguration) -> Self {
        self.mock_configurations.push(mock);
        self
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Read a request from its wire form, decoding serialized documents.
    pub fn from_json(raw: &Value) -> Result<Self, RequestError> {
        let mut request: EvaluationRequest =
            serde_json::from_value(raw.clone()).map_err(|e| RequestError::MalformedRequest {
                message: e.to_string(),
            })?;
        if request.state_name.trim().is_empty() {
            return Err(RequestError::MalformedRequest {
                message: "stateName must not be empty".to_string(),
            });
        }
        request.definition = decode_document(request.definition).map_err(|e| {
            RequestError::MalformedDefinition {
                message: format!("definition is not a valid serialized document: {}", e),
            }
        })?;
        request.input = decode_document(request.input).map_err(|e| RequestError::MalformedRequest {
            message: format!("input is not a valid serialized document: {}", e),
        })?;
        for mock in &mut request.mock_configurations {
            if let Some(output) = mock.mock_output.take() {
                let decoded = decode_document(output).map_err(|e| {
                    RequestError::InvalidMockConfiguration {
                        state_name: mock.state_name.clone(),
                        message: format!("mockOutput is not a valid serialized document: {}", e),
                    }
                })?;
                mock.mock_output = Some(decoded);
            }
        }
        Ok(request)
    }

    pub fn bindings(&self) -> Result<Vec<MockBinding>, RequestError> {
        self.mock_configurations
            .iter()
            .map(MockConfiguration::to_binding)
            .collect()
    }
}

/// A string is the serialized form of a document; anything else is the
/// document itself.
fn decode_document(raw: Value) -> Result<Value, serde_json::Error> {
    match raw {
        Value::String(text) => serde_json::from_str(&text),
        other => Ok(other),
    }
}
