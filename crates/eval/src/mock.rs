//! Mock bindings and the per-invocation mock registry.
//!
//! A binding replaces a state's real behavior with a canned output or a
//! canned error. The caller may name a state by its bare leaf name or by its
//! qualified path; registration resolves that name to exactly
//! one state and keys the binding by the state's full qualified path, so a
//! binding never applies to any other state. The caller's name is kept as
//! the label reported in applied-mock lists.

use std::collections::HashMap;

use serde_json::Value;
use statecheck_interchange::StateType;

use crate::resolve::resolve;
use crate::types::{RequestError, StateMachineDefinition};

/// What a mocked state produces instead of its real behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    Output(Value),
    Failure { error: String, cause: String },
}

/// One caller-supplied mock.
#[derive(Debug, Clone, PartialEq)]
pub struct MockBinding {
    pub state_name: String,
    pub outcome: MockOutcome,
}

/// Read-only registry of validated bindings for one evaluation.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    /// Qualified path -> (caller's name, outcome).
    bindings: HashMap<String, (String, MockOutcome)>,
}

impl MockRegistry {
    /// An empty registry: every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate `bindings` against `definition` and build the registry.
    ///
    /// Later bindings for the same state replace earlier ones.
    pub fn register(
        definition: &StateMachineDefinition,
        bindings: Vec<MockBinding>,
    ) -> Result<Self, RequestError> {
        let mut registry = MockRegistry::empty();
        for binding in bindings {
            let resolved = resolve(definition, &binding.state_name).map_err(|e| match e {
                RequestError::StateNotFound { name } => RequestError::InvalidMockConfiguration {
                    state_name: name,
                    message: "no such state in the definition".to_string(),
                },
                other => other,
            })?;

            let state_type = resolved.node.state_type();
            let invalid = |message: String| RequestError::InvalidMockConfiguration {
                state_name: binding.state_name.clone(),
                message,
            };
            match (state_type, &binding.outcome) {
                (StateType::Task | StateType::Map | StateType::Parallel, _) => {}
                (StateType::Fail, MockOutcome::Failure { .. }) => {}
                (StateType::Fail, MockOutcome::Output(_)) => {
                    return Err(invalid("Fail states can only be mocked with an error".to_string()))
                }
                (other, _) => {
                    return Err(invalid(format!(
                        "{} states do not accept mocks",
                        other.as_str()
                    )))
                }
            }

            tracing::debug!(
                state = %binding.state_name,
                resolved = %resolved.qualified_path,
                "registered mock"
            );
            registry.bindings.insert(
                resolved.qualified_path.clone(),
                (binding.state_name, binding.outcome),
            );
        }
        Ok(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Find the binding for a state, given its qualified path segments.
    ///
    /// Returns the name the caller bound it under together with its outcome.
    pub fn lookup(&self, segments: &[String]) -> Option<(&str, &MockOutcome)> {
        self.bindings
            .get(&segments.join("."))
            .map(|(name, outcome)| (name.as_str(), outcome))
    }
}

/// Record of the bindings consulted along one evaluation path.
///
/// Each concurrently evaluated branch owns its own record; records are
/// merged in declaration order after the branches are joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedMocks {
    names: Vec<String>,
    in_map: Vec<String>,
}

impl AppliedMocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `name` was applied; `within_map` marks Map iterations.
    pub fn record(&mut self, name: &str, within_map: bool) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
        if within_map && !self.in_map.iter().any(|n| n == name) {
            self.in_map.push(name.to_string());
        }
    }

    /// Fold another record into this one, keeping first-use order.
    pub fn merge(&mut self, other: AppliedMocks) {
        for name in other.names {
            if !self.names.contains(&name) {
                self.names.push(name);
            }
        }
        for name in other.in_map {
            if !self.in_map.contains(&name) {
                self.in_map.push(name);
            }
        }
    }

    /// Distinct binding names applied, in first-use order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The subset of [`names`](Self::names) applied inside Map iterations.
    pub fn map_names(&self) -> &[String] {
        &self.in_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> StateMachineDefinition {
        StateMachineDefinition::load(&json!({
            "StartAt": "PackItems",
            "States": {
                "PackItems": {
                    "Type": "Map",
                    "ItemsPath": "$.items",
                    "Next": "Checks",
                    "ItemProcessor": {"StartAt": "PackSingleItem", "States": {
                        "PackSingleItem": {"Type": "Task", "Resource": "pack", "Next": "Label"},
                        "Label": {"Type": "Task", "Resource": "label", "End": true}
                    }}
                },
                "Checks": {
                    "Type": "Parallel",
                    "Next": "Reject",
                    "Branches": [
                        {"StartAt": "Label", "States": {"Label": {"Type": "Task", "Resource": "label", "End": true}}}
                    ]
                },
                "Reject": {"Type": "Fail", "Error": "Rejected", "Cause": "no"}
            }
        }))
        .unwrap()
    }

    fn output(name: &str, v: Value) -> MockBinding {
        MockBinding {
            state_name: name.to_string(),
            outcome: MockOutcome::Output(v),
        }
    }

    fn segs(path: &str) -> Vec<String> {
        path.split('.').map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_name_binding_matches_nested_state() {
        let reg = MockRegistry::register(
            &definition(),
            vec![output("PackSingleItem", json!({"status": "MOCK_PACKED"}))],
        )
        .unwrap();
        let (name, outcome) = reg.lookup(&segs("PackItems.PackSingleItem")).unwrap();
        assert_eq!(name, "PackSingleItem");
        assert_eq!(outcome, &MockOutcome::Output(json!({"status": "MOCK_PACKED"})));
        assert!(reg.lookup(&segs("PackItems.Label")).is_none());
    }

    #[test]
    fn qualified_bindings_for_a_shared_leaf_stay_separate() {
        let reg = MockRegistry::register(
            &definition(),
            vec![
                output("PackItems.Label", json!("map")),
                output("Checks.Label", json!("parallel")),
            ],
        )
        .unwrap();
        let (name, outcome) = reg.lookup(&segs("Checks.Label")).unwrap();
        assert_eq!(name, "Checks.Label");
        assert_eq!(outcome, &MockOutcome::Output(json!("parallel")));
    }

    #[test]
    fn binding_does_not_leak_to_states_sharing_its_suffix() {
        let def = StateMachineDefinition::load(&json!({
            "StartAt": "Checks",
            "States": {
                "Checks": {
                    "Type": "Parallel",
                    "Next": "Outer",
                    "Branches": [
                        {"StartAt": "Label", "States": {"Label": {"Type": "Task", "Resource": "label", "End": true}}}
                    ]
                },
                "Outer": {
                    "Type": "Parallel",
                    "End": true,
                    "Branches": [
                        {"StartAt": "Checks", "States": {"Checks": {
                            "Type": "Parallel",
                            "End": true,
                            "Branches": [
                                {"StartAt": "Label", "States": {"Label": {"Type": "Task", "Resource": "label", "End": true}}}
                            ]
                        }}}
                    ]
                }
            }
        }))
        .unwrap();
        let reg = MockRegistry::register(&def, vec![output("Checks.Label", json!("mocked"))]).unwrap();
        let (name, _) = reg.lookup(&segs("Checks.Label")).unwrap();
        assert_eq!(name, "Checks.Label");
        assert!(reg.lookup(&segs("Outer.Checks.Label")).is_none());
    }

    #[test]
    fn last_binding_for_a_name_wins() {
        let reg = MockRegistry::register(
            &definition(),
            vec![output("PackSingleItem", json!(1)), output("PackSingleItem", json!(2))],
        )
        .unwrap();
        let (_, outcome) = reg.lookup(&segs("PackItems.PackSingleItem")).unwrap();
        assert_eq!(outcome, &MockOutcome::Output(json!(2)));
    }

    #[test]
    fn ambiguous_bare_name_fails_validation() {
        let err = MockRegistry::register(&definition(), vec![output("Label", json!({}))]).unwrap_err();
        assert!(matches!(err, RequestError::AmbiguousStateName { .. }));
    }

    #[test]
    fn unknown_state_is_invalid_mock() {
        let err = MockRegistry::register(&definition(), vec![output("Nope", json!({}))]).unwrap_err();
        match err {
            RequestError::InvalidMockConfiguration { state_name, .. } => assert_eq!(state_name, "Nope"),
            other => panic!("expected InvalidMockConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn fail_state_accepts_only_error_mocks() {
        let def = definition();
        assert!(MockRegistry::register(&def, vec![output("Reject", json!({}))]).is_err());
        assert!(MockRegistry::register(
            &def,
            vec![MockBinding {
                state_name: "Reject".to_string(),
                outcome: MockOutcome::Failure {
                    error: "Other".to_string(),
                    cause: "mocked".to_string(),
                },
            }]
        )
        .is_ok());
    }

    #[test]
    fn applied_mocks_merge_in_first_use_order() {
        let mut a = AppliedMocks::new();
        a.record("B", false);
        a.record("B", false);
        let mut b = AppliedMocks::new();
        b.record("A", true);
        b.record("B", true);
        a.merge(b);
        assert_eq!(a.names(), &["B".to_string(), "A".to_string()]);
        assert_eq!(a.map_names(), &["A".to_string(), "B".to_string()]);
    }
}
