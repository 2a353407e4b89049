//! State-machine definition model and structural validation.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;
use statecheck_interchange::{ChildGraphs, DefinitionDocument, GraphDecl, StateDecl, StateType};

use super::choice::{parse_choice_branch, parse_timestamp, ChoiceBranch};
use super::RequestError;

// ──────────────────────────────────────────────
// Definition representation
// ──────────────────────────────────────────────

/// A loaded, structurally valid state-machine definition.
///
/// Immutable once loaded. Besides the root graph it carries a flat index of
/// every state's qualified path, which is the only globally unique
/// identifier a state has.
#[derive(Debug, Clone)]
pub struct StateMachineDefinition {
    pub comment: Option<String>,
    pub root: StateGraph,
    entries: Vec<StateEntry>,
}

/// Index entry for one state anywhere in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    /// Dotted path, e.g. `RunParallelChecks.FraudCheck`.
    pub qualified_path: String,
    /// Container names followed by the state's own name.
    pub segments: Vec<String>,
}

impl StateEntry {
    /// The state's own (bare) name.
    pub fn leaf(&self) -> &str {
        self.segments.last().map(|s| s.as_str()).unwrap_or("")
    }
}

/// A graph of states with a name index.
#[derive(Debug, Clone)]
pub struct StateGraph {
    pub start_at: String,
    pub states: Vec<StateNode>,
    index: HashMap<String, usize>,
}

impl StateGraph {
    pub fn new(start_at: String, states: Vec<StateNode>) -> Self {
        let index = states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        StateGraph {
            start_at,
            states,
            index,
        }
    }

    /// Look up a state by its bare name within this graph.
    pub fn get(&self, name: &str) -> Option<&StateNode> {
        self.index.get(name).map(|&i| &self.states[i])
    }
}

/// One state in a graph.
#[derive(Debug, Clone)]
pub struct StateNode {
    pub name: String,
    pub kind: StateKind,
    /// Static successor. `None` means `End` for ordinary states; Choice,
    /// Succeed and Fail always carry `None`.
    pub next: Option<String>,
    pub io: IoSpec,
    /// Opaque `Retry` declarations, carried but not evaluated.
    pub retry: Vec<Value>,
    pub catch: Vec<CatchDecl>,
}

impl StateNode {
    pub fn state_type(&self) -> StateType {
        match self.kind {
            StateKind::Task(_) => StateType::Task,
            StateKind::Choice { .. } => StateType::Choice,
            StateKind::Map(_) => StateType::Map,
            StateKind::Parallel { .. } => StateType::Parallel,
            StateKind::Pass { .. } => StateType::Pass,
            StateKind::Wait(_) => StateType::Wait,
            StateKind::Succeed => StateType::Succeed,
            StateKind::Fail(_) => StateType::Fail,
        }
    }
}

/// Closed variant over state kinds.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum StateKind {
    Task(TaskSpec),
    Choice {
        choices: Vec<ChoiceBranch>,
        default: Option<String>,
    },
    Map(MapSpec),
    Parallel {
        branches: Vec<StateGraph>,
    },
    Pass {
        result: Option<Value>,
    },
    Wait(WaitSpec),
    Succeed,
    Fail(FailSpec),
}

/// What a Task state asks its executor to do.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub resource: String,
    pub timeout_seconds: Option<u64>,
    pub heartbeat_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MapSpec {
    pub items_path: String,
    /// `ItemSelector`, or the legacy Map `Parameters`.
    pub item_selector: Option<Value>,
    /// Zero means unbounded.
    pub max_concurrency: usize,
    pub iterator: StateGraph,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitSpec {
    Seconds(u64),
    Timestamp(String),
    SecondsPath(String),
    TimestampPath(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailSpec {
    pub error: Option<String>,
    pub cause: Option<String>,
    pub error_path: Option<String>,
    pub cause_path: Option<String>,
}

/// Input/output processing fields. A `None` path is an explicit JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct IoSpec {
    pub input_path: Option<String>,
    pub parameters: Option<Value>,
    pub result_selector: Option<Value>,
    pub result_path: Option<String>,
    pub output_path: Option<String>,
}

impl Default for IoSpec {
    fn default() -> Self {
        IoSpec {
            input_path: Some("$".to_string()),
            parameters: None,
            result_selector: None,
            result_path: Some("$".to_string()),
            output_path: Some("$".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchDecl {
    pub error_equals: Vec<String>,
    pub next: String,
}

// ──────────────────────────────────────────────
// Loading
// ──────────────────────────────────────────────

impl StateMachineDefinition {
    /// Load and validate a definition from its JSON document.
    ///
    /// A JSON string is accepted as the serialized form of the document.
    pub fn load(raw: &Value) -> Result<StateMachineDefinition, RequestError> {
        let doc = match raw {
            Value::String(text) => statecheck_interchange::from_str(text)?,
            other => statecheck_interchange::from_document(other)?,
        };
        Self::from_document(&doc)
    }

    /// Deep-parse and validate an already deserialized document.
    pub fn from_document(doc: &DefinitionDocument) -> Result<StateMachineDefinition, RequestError> {
        let root = build_graph(&doc.graph, "")?;
        let mut entries = Vec::new();
        index_graph(&root, &[], &mut entries);
        Ok(StateMachineDefinition {
            comment: doc.comment.clone(),
            root,
            entries,
        })
    }

    /// Every state in the tree, parents before children.
    pub fn entries(&self) -> &[StateEntry] {
        &self.entries
    }

    /// Qualified paths of every state, parents before children.
    pub fn qualified_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.qualified_path.as_str())
    }

    /// Find a state by its exact qualified path.
    pub fn find(&self, qualified_path: &str) -> Option<&StateNode> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.qualified_path == qualified_path)?;
        self.locate(&entry.segments).map(|(_, node)| node)
    }

    /// Walk the tree along `segments`, returning the containing graph and
    /// the state itself.
    pub fn locate(&self, segments: &[String]) -> Option<(&StateGraph, &StateNode)> {
        let mut graph = &self.root;
        for (i, seg) in segments.iter().enumerate() {
            let node = graph.get(seg)?;
            let Some(child) = segments.get(i + 1) else {
                return Some((graph, node));
            };
            graph = match &node.kind {
                StateKind::Map(map) => &map.iterator,
                StateKind::Parallel { branches } => {
                    branches.iter().find(|b| b.get(child).is_some())?
                }
                _ => return None,
            };
        }
        None
    }
}

fn malformed(message: String) -> RequestError {
    RequestError::MalformedDefinition { message }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn index_graph(graph: &StateGraph, lineage: &[String], out: &mut Vec<StateEntry>) {
    for node in &graph.states {
        let mut segments = lineage.to_vec();
        segments.push(node.name.clone());
        out.push(StateEntry {
            qualified_path: segments.join("."),
            segments: segments.clone(),
        });
        match &node.kind {
            StateKind::Map(map) => index_graph(&map.iterator, &segments, out),
            StateKind::Parallel { branches } => {
                for branch in branches {
                    index_graph(branch, &segments, out);
                }
            }
            _ => {}
        }
    }
}

/// Build and validate one graph. `prefix` is the qualified path of the
/// owning container (empty at the root) and only feeds error messages.
fn build_graph(decl: &GraphDecl, prefix: &str) -> Result<StateGraph, RequestError> {
    let states = decl
        .states
        .iter()
        .map(|s| build_state(s, prefix))
        .collect::<Result<Vec<_>, _>>()?;
    let graph = StateGraph::new(decl.start_at.clone(), states);

    check_references(&graph, prefix)?;
    check_next_cycles(&graph, prefix)?;
    Ok(graph)
}

fn check_references(graph: &StateGraph, prefix: &str) -> Result<(), RequestError> {
    let scope = if prefix.is_empty() { "<root>" } else { prefix };
    if graph.get(&graph.start_at).is_none() {
        return Err(malformed(format!(
            "StartAt '{}' in '{}' does not name a state in that graph",
            graph.start_at, scope
        )));
    }

    for node in &graph.states {
        let mut targets: Vec<&str> = Vec::new();
        if let Some(next) = &node.next {
            targets.push(next);
        }
        if let StateKind::Choice { choices, default } = &node.kind {
            targets.extend(choices.iter().map(|c| c.next.as_str()));
            if let Some(d) = default {
                targets.push(d);
            }
        }
        targets.extend(node.catch.iter().map(|c| c.next.as_str()));

        if let Some(missing) = targets.into_iter().find(|t| graph.get(t).is_none()) {
            return Err(malformed(format!(
                "state '{}' references '{}', which is not in the same graph",
                qualify(prefix, &node.name),
                missing
            )));
        }
    }
    Ok(())
}

/// Reject cycles made only of static `Next` links. Loops that pass through
/// a Choice state are data-driven and allowed.
fn check_next_cycles(graph: &StateGraph, prefix: &str) -> Result<(), RequestError> {
    let mut cleared: HashSet<&str> = HashSet::new();
    for start in &graph.states {
        let mut walk: Vec<&str> = Vec::new();
        let mut current = Some(start);
        while let Some(node) = current {
            if cleared.contains(node.name.as_str()) {
                break;
            }
            if walk.contains(&node.name.as_str()) {
                walk.push(&node.name);
                return Err(malformed(format!(
                    "cycle of unconditional 'Next' links: {}",
                    walk.iter()
                        .map(|n| qualify(prefix, n))
                        .collect::<Vec<_>>()
                        .join(" -> ")
                )));
            }
            walk.push(&node.name);
            current = node.next.as_deref().and_then(|n| graph.get(n));
        }
        cleared.extend(walk);
    }
    Ok(())
}

fn build_state(decl: &StateDecl, prefix: &str) -> Result<StateNode, RequestError> {
    let path = qualify(prefix, &decl.name);
    let err = |message: String| malformed(format!("state '{}': {}", path, message));

    let mut io = parse_io(decl).map_err(err)?;

    let kind = match decl.state_type {
        StateType::Task => {
            let resource = decl
                .field("Resource")
                .and_then(|r| r.as_str())
                .ok_or_else(|| err("Task state missing 'Resource'".to_string()))?
                .to_string();
            StateKind::Task(TaskSpec {
                resource,
                timeout_seconds: decl.field("TimeoutSeconds").and_then(|v| v.as_u64()),
                heartbeat_seconds: decl.field("HeartbeatSeconds").and_then(|v| v.as_u64()),
            })
        }
        StateType::Choice => {
            let choices = decl
                .field("Choices")
                .and_then(|c| c.as_array())
                .ok_or_else(|| err("Choice state missing 'Choices' array".to_string()))?;
            if choices.is_empty() {
                return Err(err("'Choices' must contain at least one rule".to_string()));
            }
            let choices = choices
                .iter()
                .map(parse_choice_branch)
                .collect::<Result<Vec<_>, _>>()
                .map_err(err)?;
            let default = decl
                .field("Default")
                .and_then(|d| d.as_str())
                .map(|s| s.to_string());
            StateKind::Choice { choices, default }
        }
        StateType::Map => {
            let ChildGraphs::Iterator(iterator) = &decl.children else {
                return Err(err("Map state missing 'ItemProcessor'".to_string()));
            };
            let items_path = optional_path(decl, "ItemsPath")
                .map_err(err)?
                .unwrap_or_else(|| "$".to_string());
            // Legacy Map `Parameters` is the item selector, not a state-level template.
            let item_selector = decl
                .field("ItemSelector")
                .or_else(|| decl.field("Parameters"))
                .cloned();
            io.parameters = None;
            let max_concurrency = match decl.field("MaxConcurrency") {
                None => 0,
                Some(v) => v
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        err("'MaxConcurrency' must be a non-negative integer that fits this platform".to_string())
                    })?,
            };
            StateKind::Map(MapSpec {
                items_path,
                item_selector,
                max_concurrency,
                iterator: build_graph(iterator, &path)?,
            })
        }
        StateType::Parallel => {
            let ChildGraphs::Branches(decls) = &decl.children else {
                return Err(err("Parallel state missing 'Branches'".to_string()));
            };
            let branches = decls
                .iter()
                .map(|b| build_graph(b, &path))
                .collect::<Result<Vec<_>, _>>()?;
            check_branch_names(&branches).map_err(err)?;
            StateKind::Parallel { branches }
        }
        StateType::Pass => StateKind::Pass {
            result: decl.field("Result").cloned(),
        },
        StateType::Wait => StateKind::Wait(parse_wait(decl).map_err(err)?),
        StateType::Succeed => StateKind::Succeed,
        StateType::Fail => StateKind::Fail(FailSpec {
            error: string_field(decl, "Error"),
            cause: string_field(decl, "Cause"),
            error_path: string_field(decl, "ErrorPath"),
            cause_path: string_field(decl, "CausePath"),
        }),
    };

    let retry = decl
        .field("Retry")
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();
    let catch = parse_catch(decl).map_err(err)?;

    Ok(StateNode {
        name: decl.name.clone(),
        kind,
        next: decl.next.clone(),
        io,
        retry,
        catch,
    })
}

/// State names must be unique across all branches of one Parallel so that
/// `Parallel.Child` identifies exactly one state.
fn check_branch_names(branches: &[StateGraph]) -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for name in branches.iter().flat_map(|b| b.states.iter().map(|s| &s.name)) {
        if !seen.insert(name.as_str()) {
            return Err(format!(
                "state name '{}' is declared in more than one branch",
                name
            ));
        }
    }
    Ok(())
}

fn string_field(decl: &StateDecl, key: &str) -> Option<String> {
    decl.field(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Read a path field: absent → `None`, string → must be a `$` path.
fn optional_path(decl: &StateDecl, key: &str) -> Result<Option<String>, String> {
    match decl.field(key) {
        None => Ok(None),
        Some(Value::String(p)) if p.starts_with('$') => Ok(Some(p.clone())),
        Some(other) => Err(format!("'{}' must be a path string, got {}", key, other)),
    }
}

/// Read a nullable path field: absent → `$`, `null` → `None`.
fn nullable_path(decl: &StateDecl, key: &str) -> Result<Option<String>, String> {
    match decl.field(key) {
        Some(Value::Null) => Ok(None),
        _ => Ok(Some(
            optional_path(decl, key)?.unwrap_or_else(|| "$".to_string()),
        )),
    }
}

fn parse_io(decl: &StateDecl) -> Result<IoSpec, String> {
    let template = |key: &str| -> Result<Option<Value>, String> {
        match decl.field(key) {
            None => Ok(None),
            Some(v @ Value::Object(_)) => Ok(Some(v.clone())),
            Some(other) => Err(format!("'{}' must be a JSON object, got {}", key, other)),
        }
    };
    Ok(IoSpec {
        input_path: nullable_path(decl, "InputPath")?,
        parameters: template("Parameters")?,
        result_selector: template("ResultSelector")?,
        result_path: nullable_path(decl, "ResultPath")?,
        output_path: nullable_path(decl, "OutputPath")?,
    })
}

fn parse_wait(decl: &StateDecl) -> Result<WaitSpec, String> {
    let mut specs = Vec::new();
    if let Some(v) = decl.field("Seconds") {
        let secs = v
            .as_u64()
            .ok_or_else(|| "'Seconds' must be a non-negative integer".to_string())?;
        specs.push(WaitSpec::Seconds(secs));
    }
    if let Some(v) = decl.field("Timestamp") {
        let ts = v
            .as_str()
            .filter(|s| parse_timestamp(s).is_some())
            .ok_or_else(|| "'Timestamp' must be an RFC 3339 timestamp".to_string())?;
        specs.push(WaitSpec::Timestamp(ts.to_string()));
    }
    if let Some(p) = optional_path(decl, "SecondsPath")? {
        specs.push(WaitSpec::SecondsPath(p));
    }
    if let Some(p) = optional_path(decl, "TimestampPath")? {
        specs.push(WaitSpec::TimestampPath(p));
    }
    match specs.len() {
        1 => Ok(specs.remove(0)),
        0 => Err("Wait state needs one of Seconds, Timestamp, SecondsPath, TimestampPath".to_string()),
        _ => Err("Wait state declares more than one duration field".to_string()),
    }
}

fn parse_catch(decl: &StateDecl) -> Result<Vec<CatchDecl>, String> {
    let Some(raw) = decl.field("Catch") else {
        return Ok(Vec::new());
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| "'Catch' must be an array".to_string())?;
    arr.iter()
        .map(|c| {
            let next = c
                .get("Next")
                .and_then(|n| n.as_str())
                .ok_or_else(|| "catcher missing 'Next'".to_string())?
                .to_string();
            let error_equals = c
                .get("ErrorEquals")
                .and_then(|e| e.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|e| e.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            Ok(CatchDecl { error_equals, next })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(doc: Value) -> Result<StateMachineDefinition, RequestError> {
        StateMachineDefinition::load(&doc)
    }

    fn message(err: RequestError) -> String {
        match err {
            RequestError::MalformedDefinition { message } => message,
            other => panic!("expected MalformedDefinition, got {:?}", other),
        }
    }

    #[test]
    fn indexes_nested_states_by_qualified_path() {
        let def = load(json!({
            "StartAt": "Checks",
            "States": {
                "Checks": {
                    "Type": "Parallel",
                    "Next": "Pack",
                    "Branches": [
                        {"StartAt": "Fraud", "States": {"Fraud": {"Type": "Task", "Resource": "fraud", "End": true}}},
                        {"StartAt": "Stock", "States": {"Stock": {"Type": "Task", "Resource": "stock", "End": true}}}
                    ]
                },
                "Pack": {
                    "Type": "Map",
                    "ItemsPath": "$.items",
                    "End": true,
                    "ItemProcessor": {"StartAt": "PackOne", "States": {"PackOne": {"Type": "Task", "Resource": "pack", "End": true}}}
                }
            }
        }))
        .unwrap();

        let paths: Vec<&str> = def.qualified_paths().collect();
        assert!(paths.contains(&"Checks.Fraud"));
        assert!(paths.contains(&"Checks.Stock"));
        assert!(paths.contains(&"Pack.PackOne"));
        assert_eq!(paths.len(), 5);

        let stock = def.find("Checks.Stock").unwrap();
        assert!(matches!(&stock.kind, StateKind::Task(t) if t.resource == "stock"));
        assert!(def.find("Stock").is_none());
    }

    #[test]
    fn accepts_serialized_definition() {
        let text = r#"{"StartAt":"A","States":{"A":{"Type":"Succeed"}}}"#;
        let def = StateMachineDefinition::load(&Value::String(text.to_string())).unwrap();
        assert!(def.find("A").is_some());
    }

    #[test]
    fn rejects_dangling_next() {
        let err = load(json!({"StartAt": "A", "States": {
            "A": {"Type": "Pass", "Next": "Nowhere"}
        }}))
        .unwrap_err();
        assert!(message(err).contains("Nowhere"));
    }

    #[test]
    fn rejects_dangling_start_at() {
        let err = load(json!({"StartAt": "B", "States": {"A": {"Type": "Succeed"}}})).unwrap_err();
        assert!(message(err).contains("StartAt 'B'"));
    }

    #[test]
    fn rejects_dangling_choice_default_and_catch() {
        assert!(load(json!({"StartAt": "C", "States": {
            "C": {"Type": "Choice", "Choices": [{"Variable": "$.x", "IsPresent": true, "Next": "D"}], "Default": "Gone"},
            "D": {"Type": "Succeed"}
        }}))
        .is_err());

        assert!(load(json!({"StartAt": "T", "States": {
            "T": {"Type": "Task", "Resource": "r", "End": true,
                  "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Gone"}]}
        }}))
        .is_err());
    }

    #[test]
    fn rejects_reference_across_graphs() {
        // A branch state may not jump to a state in the parent graph.
        let err = load(json!({"StartAt": "P", "States": {
            "P": {"Type": "Parallel", "Next": "Done", "Branches": [
                {"StartAt": "X", "States": {"X": {"Type": "Pass", "Next": "Done"}}}
            ]},
            "Done": {"Type": "Succeed"}
        }}))
        .unwrap_err();
        assert!(message(err).contains("P.X"));
    }

    #[test]
    fn rejects_unconditional_cycle() {
        let err = load(json!({"StartAt": "A", "States": {
            "A": {"Type": "Pass", "Next": "B"},
            "B": {"Type": "Pass", "Next": "A"}
        }}))
        .unwrap_err();
        assert!(message(err).contains("cycle"));
    }

    #[test]
    fn allows_loop_through_choice() {
        let def = load(json!({"StartAt": "Poll", "States": {
            "Poll": {"Type": "Task", "Resource": "status", "Next": "Ready?"},
            "Ready?": {"Type": "Choice",
                "Choices": [{"Variable": "$.ready", "BooleanEquals": true, "Next": "Done"}],
                "Default": "Wait"},
            "Wait": {"Type": "Wait", "Seconds": 5, "Next": "Poll"},
            "Done": {"Type": "Succeed"}
        }}));
        assert!(def.is_ok());
    }

    #[test]
    fn rejects_duplicate_names_across_branches() {
        let err = load(json!({"StartAt": "P", "States": {
            "P": {"Type": "Parallel", "End": true, "Branches": [
                {"StartAt": "Check", "States": {"Check": {"Type": "Pass", "End": true}}},
                {"StartAt": "Check", "States": {"Check": {"Type": "Pass", "End": true}}}
            ]}
        }}))
        .unwrap_err();
        assert!(message(err).contains("more than one branch"));
    }

    #[test]
    fn map_concurrency_must_be_a_non_negative_integer() {
        let map = |limit: Value| {
            load(json!({"StartAt": "M", "States": {
                "M": {"Type": "Map", "End": true, "MaxConcurrency": limit,
                      "ItemProcessor": {"StartAt": "Work", "States": {"Work": {"Type": "Pass", "End": true}}}}
            }}))
        };
        let def = map(json!(4)).unwrap();
        match &def.find("M").unwrap().kind {
            StateKind::Map(m) => assert_eq!(m.max_concurrency, 4),
            other => panic!("expected Map, got {:?}", other),
        }
        assert!(message(map(json!(-1)).unwrap_err()).contains("MaxConcurrency"));
        assert!(message(map(json!("8")).unwrap_err()).contains("MaxConcurrency"));
    }

    #[test]
    fn same_leaf_name_under_different_containers_is_allowed() {
        let def = load(json!({"StartAt": "M1", "States": {
            "M1": {"Type": "Map", "Next": "M2",
                   "ItemProcessor": {"StartAt": "Work", "States": {"Work": {"Type": "Pass", "End": true}}}},
            "M2": {"Type": "Map", "End": true,
                   "ItemProcessor": {"StartAt": "Work", "States": {"Work": {"Type": "Pass", "End": true}}}}
        }}))
        .unwrap();
        assert!(def.find("M1.Work").is_some());
        assert!(def.find("M2.Work").is_some());
    }

    #[test]
    fn parses_io_fields_and_null_paths() {
        let def = load(json!({"StartAt": "A", "States": {
            "A": {"Type": "Pass", "End": true, "InputPath": "$.order", "ResultPath": null}
        }}))
        .unwrap();
        let a = def.find("A").unwrap();
        assert_eq!(a.io.input_path.as_deref(), Some("$.order"));
        assert_eq!(a.io.result_path, None);
        assert_eq!(a.io.output_path.as_deref(), Some("$"));
    }

    #[test]
    fn map_parameters_become_item_selector() {
        let def = load(json!({"StartAt": "M", "States": {
            "M": {"Type": "Map", "End": true, "MaxConcurrency": 2,
                  "Parameters": {"sku.$": "$$.Map.Item.Value.sku"},
                  "Iterator": {"StartAt": "W", "States": {"W": {"Type": "Pass", "End": true}}}}
        }}))
        .unwrap();
        let m = def.find("M").unwrap();
        assert!(m.io.parameters.is_none());
        match &m.kind {
            StateKind::Map(map) => {
                assert_eq!(map.items_path, "$");
                assert_eq!(map.max_concurrency, 2);
                assert!(map.item_selector.is_some());
            }
            other => panic!("expected Map, got {:?}", other),
        }
    }

    #[test]
    fn wait_requires_exactly_one_duration() {
        assert!(load(json!({"StartAt": "W", "States": {"W": {"Type": "Wait", "End": true}}})).is_err());
        assert!(load(json!({"StartAt": "W", "States": {
            "W": {"Type": "Wait", "Seconds": 1, "SecondsPath": "$.s", "End": true}
        }}))
        .is_err());
    }

    #[test]
    fn task_requires_resource() {
        let err = load(json!({"StartAt": "T", "States": {"T": {"Type": "Task", "End": true}}}))
            .unwrap_err();
        assert!(message(err).contains("Resource"));
    }
}
