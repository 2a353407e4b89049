//! Typed structs representing a state-machine definition document.
//!
//! These types cover the structural fields every consumer needs: names,
//! state types, transitions and nested graphs. Everything type-specific is
//! stored as `serde_json::Value` in [`StateDecl::fields`] so consumers can
//! interpret it on their own terms.

use serde::{Deserialize, Serialize};

/// Top-level definition document.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionDocument {
    /// Optional human description (`Comment`).
    pub comment: Option<String>,
    /// Optional definition language version (`Version`).
    pub version: Option<String>,
    /// Machine-wide timeout (`TimeoutSeconds`), recorded but not enforced.
    pub timeout_seconds: Option<u64>,
    /// The root state graph.
    pub graph: GraphDecl,
}

/// A graph of states: the root machine, one Parallel branch, or a Map
/// iterator.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDecl {
    pub start_at: String,
    pub states: Vec<StateDecl>,
}

impl GraphDecl {
    /// Look up a state declaration by name.
    pub fn get(&self, name: &str) -> Option<&StateDecl> {
        self.states.iter().find(|s| s.name == name)
    }
}

/// The closed set of state types the definition language knows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StateType {
    Task,
    Choice,
    Map,
    Parallel,
    Pass,
    Wait,
    Succeed,
    Fail,
}

impl StateType {
    /// Parse the `Type` field of a state.
    pub fn parse(s: &str) -> Option<StateType> {
        match s {
            "Task" => Some(StateType::Task),
            "Choice" => Some(StateType::Choice),
            "Map" => Some(StateType::Map),
            "Parallel" => Some(StateType::Parallel),
            "Pass" => Some(StateType::Pass),
            "Wait" => Some(StateType::Wait),
            "Succeed" => Some(StateType::Succeed),
            "Fail" => Some(StateType::Fail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateType::Task => "Task",
            StateType::Choice => "Choice",
            StateType::Map => "Map",
            StateType::Parallel => "Parallel",
            StateType::Pass => "Pass",
            StateType::Wait => "Wait",
            StateType::Succeed => "Succeed",
            StateType::Fail => "Fail",
        }
    }
}

/// Nested graphs owned by a container state.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildGraphs {
    None,
    /// Parallel `Branches`, in declaration order.
    Branches(Vec<GraphDecl>),
    /// Map `ItemProcessor` (or the legacy `Iterator` field).
    Iterator(Box<GraphDecl>),
}

/// One state declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDecl {
    pub name: String,
    pub state_type: StateType,
    pub next: Option<String>,
    pub end: bool,
    pub comment: Option<String>,
    pub children: ChildGraphs,
    /// Every remaining field of the state object, verbatim.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StateDecl {
    /// Raw access to a type-specific field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}
