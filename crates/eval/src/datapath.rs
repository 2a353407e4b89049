//! Reference paths, payload templates and the input/output pipeline.
//!
//! Paths are the restricted JSONPath subset the definition language allows
//! in `InputPath`, `ResultPath`, `OutputPath` and `Variable`: a `$` (state
//! input) or `$$` (context object) root followed by `.field`, `['field']`
//! and `[index]` steps. Wildcards and filters are rejected.

use std::fmt;

use serde_json::{Map, Value};

use crate::types::IoSpec;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors raised while reading or writing documents by path.
///
/// These surface as `States.Runtime` failures of the state being evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPathError {
    /// The path does not follow the reference-path grammar.
    InvalidPath { path: String, message: String },
    /// The path is well formed but selects nothing.
    NotFound { path: String },
    /// A write crossed a value that is not an object.
    NotAnObject { path: String },
    /// A `.$` template entry could not be resolved.
    InvalidTemplate { key: String, message: String },
}

impl fmt::Display for DataPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataPathError::InvalidPath { path, message } => {
                write!(f, "invalid path '{}': {}", path, message)
            }
            DataPathError::NotFound { path } => {
                write!(f, "path '{}' could not be found in the input", path)
            }
            DataPathError::NotAnObject { path } => {
                write!(f, "cannot write to '{}': an intermediate value is not an object", path)
            }
            DataPathError::InvalidTemplate { key, message } => {
                write!(f, "template field '{}': {}", key, message)
            }
        }
    }
}

impl std::error::Error for DataPathError {}

// ──────────────────────────────────────────────
// Path parsing
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// A parsed reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    /// `$$` paths read the context object instead of the state input.
    pub context: bool,
    pub segments: Vec<Segment>,
}

pub fn parse_path(path: &str) -> Result<ReferencePath, DataPathError> {
    let invalid = |message: &str| DataPathError::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };

    let (context, mut rest) = if let Some(r) = path.strip_prefix("$$") {
        (true, r)
    } else if let Some(r) = path.strip_prefix('$') {
        (false, r)
    } else {
        return Err(invalid("must start with '$'"));
    };

    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(r) = rest.strip_prefix('.') {
            let end = r.find(&['.', '['][..]).unwrap_or(r.len());
            let name = &r[..end];
            if name.is_empty() {
                return Err(invalid("empty field name"));
            }
            if name == "*" {
                return Err(invalid("wildcards are not supported"));
            }
            segments.push(Segment::Field(name.to_string()));
            rest = &r[end..];
        } else if let Some(r) = rest.strip_prefix('[') {
            let close = r.find(']').ok_or_else(|| invalid("unclosed '['"))?;
            let inner = &r[..close];
            let quoted = inner
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
            if let Some(name) = quoted {
                segments.push(Segment::Field(name.to_string()));
            } else {
                let index = inner
                    .parse::<usize>()
                    .map_err(|_| invalid("only quoted names and non-negative indices are supported in brackets"))?;
                segments.push(Segment::Index(index));
            }
            rest = &r[close + 1..];
        } else {
            return Err(invalid("expected '.' or '['"));
        }
    }

    Ok(ReferencePath { context, segments })
}

// ──────────────────────────────────────────────
// Reading and writing
// ──────────────────────────────────────────────

/// Resolve `path`, returning `None` when it selects nothing.
pub fn lookup<'a>(
    path: &str,
    input: &'a Value,
    context: &'a Value,
) -> Result<Option<&'a Value>, DataPathError> {
    let parsed = parse_path(path)?;
    let mut current = if parsed.context { context } else { input };
    for seg in &parsed.segments {
        let next = match seg {
            Segment::Field(name) => current.as_object().and_then(|o| o.get(name)),
            Segment::Index(i) => current.as_array().and_then(|a| a.get(*i)),
        };
        match next {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Resolve `path`, failing when it selects nothing.
pub fn select<'a>(
    path: &str,
    input: &'a Value,
    context: &'a Value,
) -> Result<&'a Value, DataPathError> {
    lookup(path, input, context)?.ok_or_else(|| DataPathError::NotFound {
        path: path.to_string(),
    })
}

/// Place `value` at `path` inside `target`, creating intermediate objects.
///
/// `$` replaces the whole document. Only field steps may be written.
pub fn write(target: Value, path: &str, value: Value) -> Result<Value, DataPathError> {
    let parsed = parse_path(path)?;
    if parsed.context {
        return Err(DataPathError::InvalidPath {
            path: path.to_string(),
            message: "cannot write into the context object".to_string(),
        });
    }
    if parsed.segments.is_empty() {
        return Ok(value);
    }

    let mut root = target;
    let mut slot = &mut root;
    for seg in &parsed.segments {
        let Segment::Field(name) = seg else {
            return Err(DataPathError::InvalidPath {
                path: path.to_string(),
                message: "result paths cannot contain array indices".to_string(),
            });
        };
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        slot = match slot {
            Value::Object(obj) => obj.entry(name.clone()).or_insert(Value::Null),
            _ => {
                return Err(DataPathError::NotAnObject {
                    path: path.to_string(),
                })
            }
        };
    }
    *slot = value;
    Ok(root)
}

/// Render a payload template.
///
/// Object keys ending in `.$` take their value from the path they hold;
/// every other entry is copied verbatim (recursively).
pub fn render_template(
    template: &Value,
    input: &Value,
    context: &Value,
) -> Result<Value, DataPathError> {
    match template {
        Value::Object(fields) => {
            let mut out = Map::new();
            for (key, v) in fields {
                if let Some(stripped) = key.strip_suffix(".$") {
                    let path = v.as_str().ok_or_else(|| DataPathError::InvalidTemplate {
                        key: key.clone(),
                        message: "value must be a path string".to_string(),
                    })?;
                    if path.starts_with("States.") {
                        return Err(DataPathError::InvalidTemplate {
                            key: key.clone(),
                            message: format!("intrinsic functions are not supported: {}", path),
                        });
                    }
                    let selected = select(path, input, context)?;
                    out.insert(stripped.to_string(), selected.clone());
                } else {
                    out.insert(key.clone(), render_template(v, input, context)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|i| render_template(i, input, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

// ──────────────────────────────────────────────
// Input/output pipeline
// ──────────────────────────────────────────────

/// Apply `InputPath`. A null path yields an empty object.
pub fn apply_input_path(io: &IoSpec, raw: &Value, context: &Value) -> Result<Value, DataPathError> {
    match &io.input_path {
        None => Ok(Value::Object(Map::new())),
        Some(path) => select(path, raw, context).cloned(),
    }
}

/// Apply `InputPath` then `Parameters`: the value a Task or Pass works on.
pub fn effective_input(io: &IoSpec, raw: &Value, context: &Value) -> Result<Value, DataPathError> {
    let selected = apply_input_path(io, raw, context)?;
    match &io.parameters {
        Some(template) => render_template(template, &selected, context),
        None => Ok(selected),
    }
}

/// Apply `ResultSelector`, `ResultPath` and `OutputPath` to a state result.
///
/// `ResultPath` merges into the state's raw input, not the effective input.
pub fn apply_result(
    io: &IoSpec,
    raw: &Value,
    result: Value,
    context: &Value,
) -> Result<Value, DataPathError> {
    let result = match &io.result_selector {
        Some(template) => render_template(template, &result, context)?,
        None => result,
    };
    let merged = match &io.result_path {
        None => raw.clone(),
        Some(path) => write(raw.clone(), path, result)?,
    };
    apply_output_path(io, merged, context)
}

/// Apply `OutputPath`. A null path yields an empty object.
pub fn apply_output_path(io: &IoSpec, value: Value, context: &Value) -> Result<Value, DataPathError> {
    match &io.output_path {
        None => Ok(Value::Object(Map::new())),
        Some(path) if path == "$" => Ok(value),
        Some(path) => select(path, &value, context).cloned(),
    }
}
