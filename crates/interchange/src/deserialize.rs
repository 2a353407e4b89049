//! Deserialization from definition JSON into typed structs.
//!
//! The main entry point is [`from_document`], which takes a
//! `&serde_json::Value` and produces a [`DefinitionDocument`].

use crate::types::*;
use std::fmt;

/// Errors during definition deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    /// A graph is missing a required field (`StartAt`, `States`).
    MissingField { field: String },
    /// A state declaration is structurally invalid.
    StateError { state: String, message: String },
    /// The document as a whole is invalid.
    InvalidDocument(String),
}

impl fmt::Display for InterchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeError::MissingField { field } => {
                write!(f, "definition missing required field: '{}'", field)
            }
            InterchangeError::StateError { state, message } => {
                write!(f, "state '{}': {}", state, message)
            }
            InterchangeError::InvalidDocument(msg) => {
                write!(f, "invalid definition: {}", msg)
            }
        }
    }
}

impl std::error::Error for InterchangeError {}

/// Parse a definition from its serialized JSON text.
pub fn from_str(text: &str) -> Result<DefinitionDocument, InterchangeError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| InterchangeError::InvalidDocument(format!("not valid JSON: {}", e)))?;
    from_document(&value)
}

/// Deserialize a definition document into typed structs.
///
/// Walks `States` recursively, descending into Parallel `Branches` and Map
/// `ItemProcessor`/`Iterator` graphs. Cross-state references are not checked
/// here; that is the consumer's job once all graphs are known.
pub fn from_document(doc: &serde_json::Value) -> Result<DefinitionDocument, InterchangeError> {
    if !doc.is_object() {
        return Err(InterchangeError::InvalidDocument(
            "definition must be a JSON object".to_string(),
        ));
    }

    let graph = parse_graph(doc)?;

    let comment = optional_str(doc, "Comment");
    let version = optional_str(doc, "Version");
    let timeout_seconds = doc.get("TimeoutSeconds").and_then(|v| v.as_u64());

    Ok(DefinitionDocument {
        comment,
        version,
        timeout_seconds,
        graph,
    })
}

// ── Parsing helpers ─────────────────────────────────────────────────

/// Keys interpreted structurally; everything else lands in `StateDecl::fields`.
const STRUCTURAL_KEYS: &[&str] = &[
    "Type",
    "Next",
    "End",
    "Comment",
    "Branches",
    "ItemProcessor",
    "Iterator",
];

fn optional_str(obj: &serde_json::Value, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn state_error(state: &str, message: impl Into<String>) -> InterchangeError {
    InterchangeError::StateError {
        state: state.to_string(),
        message: message.into(),
    }
}

fn parse_graph(obj: &serde_json::Value) -> Result<GraphDecl, InterchangeError> {
    let start_at = obj
        .get("StartAt")
        .and_then(|v| v.as_str())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "StartAt".to_string(),
        })?
        .to_string();

    let states_obj = obj
        .get("States")
        .and_then(|s| s.as_object())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "States".to_string(),
        })?;

    if states_obj.is_empty() {
        return Err(InterchangeError::InvalidDocument(
            "'States' must declare at least one state".to_string(),
        ));
    }

    let states = states_obj
        .iter()
        .map(|(name, state)| parse_state(name, state))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GraphDecl { start_at, states })
}

fn parse_state(name: &str, obj: &serde_json::Value) -> Result<StateDecl, InterchangeError> {
    let map = obj
        .as_object()
        .ok_or_else(|| state_error(name, "state must be a JSON object"))?;

    let type_str = map
        .get("Type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| state_error(name, "missing 'Type' field"))?;
    let state_type = StateType::parse(type_str)
        .ok_or_else(|| state_error(name, format!("unknown state type '{}'", type_str)))?;

    let next = match map.get("Next") {
        None => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(state_error(name, "'Next' must be a string")),
    };
    let end = match map.get("End") {
        None => false,
        Some(serde_json::Value::Bool(b)) => *b,
        Some(_) => return Err(state_error(name, "'End' must be a boolean")),
    };

    // Choice routes through its rules; Succeed and Fail stop the walk.
    match state_type {
        StateType::Choice | StateType::Succeed | StateType::Fail => {
            if next.is_some() || end {
                return Err(state_error(
                    name,
                    format!("{} states cannot declare 'Next' or 'End'", type_str),
                ));
            }
        }
        _ => match (&next, end) {
            (Some(_), true) => {
                return Err(state_error(name, "'Next' and 'End' are mutually exclusive"))
            }
            (None, false) => {
                return Err(state_error(name, "state must declare either 'Next' or 'End'"))
            }
            _ => {}
        },
    }

    let children = match state_type {
        StateType::Parallel => {
            let branches = map
                .get("Branches")
                .and_then(|b| b.as_array())
                .ok_or_else(|| state_error(name, "Parallel state missing 'Branches' array"))?;
            if branches.is_empty() {
                return Err(state_error(name, "Parallel state must declare at least one branch"));
            }
            let graphs = branches
                .iter()
                .map(|b| parse_graph(b).map_err(|e| nest_error(name, e)))
                .collect::<Result<Vec<_>, _>>()?;
            ChildGraphs::Branches(graphs)
        }
        StateType::Map => {
            let processor = map
                .get("ItemProcessor")
                .or_else(|| map.get("Iterator"))
                .ok_or_else(|| state_error(name, "Map state missing 'ItemProcessor'"))?;
            let graph = parse_graph(processor).map_err(|e| nest_error(name, e))?;
            ChildGraphs::Iterator(Box::new(graph))
        }
        _ => ChildGraphs::None,
    };

    let comment = map
        .get("Comment")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string());

    let fields = map
        .iter()
        .filter(|(k, _)| !STRUCTURAL_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(StateDecl {
        name: name.to_string(),
        state_type,
        next,
        end,
        comment,
        children,
        fields,
    })
}

/// Prefix a nested graph error with its container's name.
fn nest_error(container: &str, err: InterchangeError) -> InterchangeError {
    match err {
        InterchangeError::StateError { state, message } => InterchangeError::StateError {
            state: format!("{}.{}", container, state),
            message,
        },
        other => state_error(container, other.to_string()),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
