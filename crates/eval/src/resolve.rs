//! State name resolution.
//!
//! Callers name states either by qualified path (`RunParallelChecks.FraudCheck`)
//! or by bare leaf name (`FraudCheck`). An exact qualified match always wins;
//! a bare name must be unique across the whole tree.

use crate::types::{RequestError, StateEntry, StateGraph, StateMachineDefinition, StateNode};

/// A state located in the definition tree.
#[derive(Debug, Clone)]
pub struct ResolvedState<'a> {
    pub node: &'a StateNode,
    /// The graph that declares the state; subgraph walks stay inside it.
    pub graph: &'a StateGraph,
    pub qualified_path: String,
    /// Names of the enclosing container states, outermost first.
    pub ancestors: Vec<String>,
}

/// Find the index entry a caller-supplied name refers to.
pub fn resolve_entry<'a>(
    definition: &'a StateMachineDefinition,
    name: &str,
) -> Result<&'a StateEntry, RequestError> {
    let entries = definition.entries();

    if let Some(exact) = entries.iter().find(|e| e.qualified_path == name) {
        return Ok(exact);
    }

    let by_leaf: Vec<&StateEntry> = entries.iter().filter(|e| e.leaf() == name).collect();
    match by_leaf.as_slice() {
        [] => Err(RequestError::StateNotFound {
            name: name.to_string(),
        }),
        [single] => Ok(*single),
        many => Err(RequestError::AmbiguousStateName {
            name: name.to_string(),
            candidates: many.iter().map(|e| e.qualified_path.clone()).collect(),
        }),
    }
}

/// Resolve a qualified or bare state name to its node and ancestor chain.
pub fn resolve<'a>(
    definition: &'a StateMachineDefinition,
    name: &str,
) -> Result<ResolvedState<'a>, RequestError> {
    let entry = resolve_entry(definition, name)?;
    let (graph, node) =
        definition
            .locate(&entry.segments)
            .ok_or_else(|| RequestError::StateNotFound {
                name: name.to_string(),
            })?;
    let ancestors = entry.segments[..entry.segments.len() - 1].to_vec();
    Ok(ResolvedState {
        node,
        graph,
        qualified_path: entry.qualified_path.clone(),
        ancestors,
    })
}
