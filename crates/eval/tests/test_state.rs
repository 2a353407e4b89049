//! End-to-end evaluation tests against the public API.
//!
//! The definitions model a small order-processing machine: shipping is
//! routed by a Choice, items are packed by a Map and fraud and inventory
//! checks run in a Parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use statecheck_eval::types::TaskSpec;
use statecheck_eval::{
    error_codes, EvalConfig, EvaluationMode, EvaluationRequest, EvaluationResult, Evaluator,
    MockConfiguration, RequestError, StaticTaskExecutor, TaskError, TaskExecutor,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn order_machine() -> Value {
    json!({
        "Comment": "Order processing",
        "StartAt": "ValidateOrder",
        "States": {
            "ValidateOrder": {"Type": "Task", "Resource": "arn:validate", "Next": "DetermineShipping"},
            "DetermineShipping": {
                "Type": "Choice",
                "Choices": [
                    {"Variable": "$.total", "NumericGreaterThan": 100, "Next": "SetExpressShipping"}
                ],
                "Default": "SetStandardShipping"
            },
            "SetExpressShipping": {"Type": "Pass", "Result": {"shipping": "EXPRESS"}, "End": true},
            "SetStandardShipping": {"Type": "Pass", "Result": {"shipping": "STANDARD"}, "End": true},
            "PackItems": {
                "Type": "Map",
                "ItemsPath": "$.items",
                "ResultPath": "$.packedItems",
                "Next": "RunParallelChecks",
                "ItemProcessor": {"StartAt": "PackSingleItem", "States": {
                    "PackSingleItem": {"Type": "Task", "Resource": "arn:pack", "End": true}
                }}
            },
            "RunParallelChecks": {
                "Type": "Parallel",
                "End": true,
                "Branches": [
                    {"StartAt": "InventoryCheck", "States": {
                        "InventoryCheck": {"Type": "Pass", "Result": {"inStock": true}, "End": true}
                    }},
                    {"StartAt": "FraudCheck", "States": {
                        "FraudCheck": {"Type": "Task", "Resource": "arn:fraud", "End": true}
                    }}
                ]
            }
        }
    })
}

/// Counts calls per resource and echoes its input.
#[derive(Default)]
struct CountingExecutor {
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingExecutor {
    fn calls(&self, resource: &str) -> usize {
        self.calls.lock().unwrap().get(resource).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TaskExecutor for CountingExecutor {
    async fn execute(&self, task: &TaskSpec, input: &Value) -> Result<Value, TaskError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(task.resource.clone())
            .or_default() += 1;
        Ok(input.clone())
    }
}

// ──────────────────────────────────────
// Scenario A: Choice
// ──────────────────────────────────────

#[tokio::test]
async fn choice_subgraph_yields_matched_branch_output() {
    init_tracing();
    let request = EvaluationRequest::new(order_machine(), json!({"total": 150}), "DetermineShipping")
        .with_mode(EvaluationMode::Subgraph);
    let result = Evaluator::new().evaluate(&request).await.unwrap();
    match result {
        EvaluationResult::Success {
            output,
            inspected_state_name,
            steps,
            ..
        } => {
            assert_eq!(output, json!({"shipping": "EXPRESS"}));
            assert_eq!(inspected_state_name, "DetermineShipping");
            let visited: Vec<&str> = steps.iter().map(|s| s.state_path.as_str()).collect();
            assert_eq!(visited, vec!["DetermineShipping", "SetExpressShipping"]);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn choice_alone_reports_next_state() {
    let request = EvaluationRequest::new(order_machine(), json!({"total": 150}), "DetermineShipping");
    let json = Evaluator::new().evaluate(&request).await.unwrap().to_json();
    assert_eq!(
        json,
        json!({
            "status": "SUCCEEDED",
            "output": {"total": 150},
            "inspectedStateName": "DetermineShipping",
            "nextState": "SetExpressShipping"
        })
    );
}

// ──────────────────────────────────────
// Scenario B: Map with a mocked child
// ──────────────────────────────────────

#[tokio::test]
async fn map_with_mocked_child_packs_every_item() {
    init_tracing();
    let executor = Arc::new(CountingExecutor::default());
    let request = EvaluationRequest::new(
        order_machine(),
        json!({"items": [{"id": 1}, {"id": 2}]}),
        "PackItems",
    )
    .with_mock(MockConfiguration::output(
        "PackSingleItem",
        json!({"status": "MOCK_PACKED"}),
    ));
    let result = Evaluator::new()
        .with_executor(executor.clone())
        .evaluate(&request)
        .await
        .unwrap();

    let EvaluationResult::Success {
        output,
        applied_mock_names,
        map_mocks_applied,
        next_state,
        ..
    } = result
    else {
        panic!("expected success");
    };
    let packed = output["packedItems"].as_array().unwrap();
    assert_eq!(packed.len(), 2);
    assert!(packed.iter().all(|p| p["status"] == json!("MOCK_PACKED")));
    assert_eq!(output["items"], json!([{"id": 1}, {"id": 2}]));
    assert_eq!(applied_mock_names, vec!["PackSingleItem".to_string()]);
    assert_eq!(map_mocks_applied, vec!["PackSingleItem".to_string()]);
    assert_eq!(next_state.as_deref(), Some("RunParallelChecks"));
    assert_eq!(executor.calls("arn:pack"), 0);
}

#[tokio::test]
async fn map_output_follows_input_order() {
    let items: Vec<Value> = (0..25).map(|i| json!({"id": i})).collect();
    let executor = Arc::new(CountingExecutor::default());
    let request = EvaluationRequest::new(order_machine(), json!({"items": items}), "PackItems");
    let result = Evaluator::new()
        .with_executor(executor.clone())
        .with_config(EvalConfig {
            max_concurrency: 4,
            ..EvalConfig::default()
        })
        .evaluate(&request)
        .await
        .unwrap();
    let EvaluationResult::Success { output, .. } = result else {
        panic!("expected success");
    };
    assert_eq!(output["packedItems"], json!(items));
    assert_eq!(executor.calls("arn:pack"), 25);
}

// ──────────────────────────────────────
// Scenario C: Parallel with a mocked failure
// ──────────────────────────────────────

#[tokio::test]
async fn parallel_failure_reports_child_path_and_partial_results() {
    init_tracing();
    let executor = Arc::new(CountingExecutor::default());
    let request = EvaluationRequest::new(order_machine(), json!({"orderId": "o-42"}), "RunParallelChecks")
        .with_mock(MockConfiguration::error(
            "FraudCheck",
            "FraudulentOrder",
            "Risk score above threshold",
        ));
    let result = Evaluator::new()
        .with_executor(executor.clone())
        .evaluate(&request)
        .await
        .unwrap();

    match result {
        EvaluationResult::Failure {
            error,
            cause,
            error_caused_by_state,
            partial_results,
            applied_mock_names,
        } => {
            assert_eq!(error, "FraudulentOrder");
            assert_eq!(cause, "Risk score above threshold");
            assert_eq!(error_caused_by_state, "RunParallelChecks.FraudCheck");
            assert_eq!(partial_results.len(), 1);
            assert_eq!(partial_results[0].branch, "InventoryCheck");
            assert_eq!(partial_results[0].container, "RunParallelChecks");
            assert_eq!(partial_results[0].output, json!({"inStock": true}));
            assert_eq!(applied_mock_names, vec!["FraudCheck".to_string()]);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(executor.calls("arn:fraud"), 0);
}

#[tokio::test]
async fn parallel_success_is_in_declaration_order() {
    let executor = StaticTaskExecutor::new().with_output("arn:fraud", json!({"score": 2}));
    let request = EvaluationRequest::new(order_machine(), json!({}), "RunParallelChecks");
    let result = Evaluator::new()
        .with_executor(Arc::new(executor))
        .evaluate(&request)
        .await
        .unwrap();
    let EvaluationResult::Success { output, .. } = result else {
        panic!("expected success");
    };
    assert_eq!(output, json!([{"inStock": true}, {"score": 2}]));
}

// ──────────────────────────────────────
// Isolation and idempotence
// ──────────────────────────────────────

#[tokio::test]
async fn mocked_task_never_invokes_executor() {
    let executor = Arc::new(CountingExecutor::default());
    let evaluator = Evaluator::new().with_executor(executor.clone());

    let mocked = EvaluationRequest::new(order_machine(), json!({"total": 5}), "ValidateOrder")
        .with_mock(MockConfiguration::output("ValidateOrder", json!({"valid": true})));
    let result = evaluator.evaluate(&mocked).await.unwrap();
    assert!(result.is_success());
    assert_eq!(executor.calls("arn:validate"), 0);

    let unmocked = EvaluationRequest::new(order_machine(), json!({"total": 5}), "ValidateOrder");
    evaluator.evaluate(&unmocked).await.unwrap();
    assert_eq!(executor.calls("arn:validate"), 1);
}

#[tokio::test]
async fn unmocked_task_without_executor_is_a_domain_failure() {
    let request = EvaluationRequest::new(order_machine(), json!({}), "ValidateOrder");
    let result = statecheck_eval::evaluate(&request).await.unwrap();
    match result {
        EvaluationResult::Failure {
            error,
            error_caused_by_state,
            ..
        } => {
            assert_eq!(error, error_codes::TASK_FAILED);
            assert_eq!(error_caused_by_state, "ValidateOrder");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn evaluating_twice_gives_identical_results() {
    let request = EvaluationRequest::new(order_machine(), json!({"orderId": "o-1"}), "RunParallelChecks")
        .with_mock(MockConfiguration::error("FraudCheck", "FraudulentOrder", "x"));
    let evaluator = Evaluator::new();
    let first = evaluator.evaluate(&request).await.unwrap();
    let second = evaluator.evaluate(&request).await.unwrap();
    assert_eq!(first, second);
}

// ──────────────────────────────────────
// Name resolution
// ──────────────────────────────────────

fn machine_with_repeated_leaf() -> Value {
    json!({
        "StartAt": "Checks",
        "States": {
            "Checks": {
                "Type": "Parallel",
                "Next": "Ship",
                "Branches": [
                    {"StartAt": "Notify", "States": {"Notify": {"Type": "Task", "Resource": "arn:notify", "End": true}}}
                ]
            },
            "Ship": {
                "Type": "Map",
                "End": true,
                "ItemProcessor": {"StartAt": "Notify", "States": {
                    "Notify": {"Type": "Task", "Resource": "arn:notify", "End": true}
                }}
            }
        }
    })
}

#[tokio::test]
async fn ambiguous_bare_mock_name_is_rejected() {
    let request = EvaluationRequest::new(machine_with_repeated_leaf(), json!([1]), "Ship")
        .with_mock(MockConfiguration::output("Notify", json!({})));
    let err = Evaluator::new().evaluate(&request).await.unwrap_err();
    match err {
        RequestError::AmbiguousStateName { name, candidates } => {
            assert_eq!(name, "Notify");
            assert_eq!(candidates, vec!["Checks.Notify", "Ship.Notify"]);
        }
        other => panic!("expected AmbiguousStateName, got {:?}", other),
    }
}

#[tokio::test]
async fn qualified_mock_name_disambiguates() {
    let request = EvaluationRequest::new(machine_with_repeated_leaf(), json!([1, 2]), "Ship")
        .with_mock(MockConfiguration::output("Ship.Notify", json!("sent")));
    let result = Evaluator::new().evaluate(&request).await.unwrap();
    let EvaluationResult::Success {
        output,
        applied_mock_names,
        ..
    } = result
    else {
        panic!("expected success");
    };
    assert_eq!(output, json!(["sent", "sent"]));
    assert_eq!(applied_mock_names, vec!["Ship.Notify".to_string()]);
}

#[tokio::test]
async fn qualified_mock_applies_only_to_its_own_state() {
    let machine = json!({
        "StartAt": "Checks",
        "States": {
            "Checks": {
                "Type": "Parallel",
                "Next": "Outer",
                "Branches": [
                    {"StartAt": "Label", "States": {"Label": {"Type": "Task", "Resource": "arn:label", "End": true}}}
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
                            {"StartAt": "Label", "States": {"Label": {"Type": "Task", "Resource": "arn:label", "End": true}}}
                        ]
                    }}}
                ]
            }
        }
    });
    let executor = StaticTaskExecutor::new().with_output("arn:label", json!("REAL"));
    let evaluator = Evaluator::new().with_executor(Arc::new(executor));

    let outer = EvaluationRequest::new(machine.clone(), json!({}), "Outer")
        .with_mock(MockConfiguration::output("Checks.Label", json!({"m": "MOCKED"})));
    let EvaluationResult::Success {
        output,
        applied_mock_names,
        ..
    } = evaluator.evaluate(&outer).await.unwrap()
    else {
        panic!("expected success");
    };
    assert_eq!(output, json!([["REAL"]]));
    assert!(applied_mock_names.is_empty());

    let root = EvaluationRequest::new(machine, json!({}), "Checks")
        .with_mock(MockConfiguration::output("Checks.Label", json!({"m": "MOCKED"})));
    let EvaluationResult::Success { output, .. } = evaluator.evaluate(&root).await.unwrap() else {
        panic!("expected success");
    };
    assert_eq!(output, json!([{"m": "MOCKED"}]));
}

#[tokio::test]
async fn string_documents_pass_through_the_rust_api() {
    let machine = json!({
        "StartAt": "Echo",
        "States": {"Echo": {"Type": "Pass", "End": true}}
    });
    let request = EvaluationRequest::new(machine, json!("just text"), "Echo");
    let result = statecheck_eval::evaluate(&request).await.unwrap();
    assert_eq!(
        result.to_json(),
        json!({"status": "SUCCEEDED", "output": "just text", "inspectedStateName": "Echo"})
    );
}

#[tokio::test]
async fn nested_target_is_found_by_bare_name() {
    let executor = StaticTaskExecutor::new().with_output("arn:fraud", json!({"score": 1}));
    let request = EvaluationRequest::new(order_machine(), json!({}), "FraudCheck");
    let result = Evaluator::new()
        .with_executor(Arc::new(executor))
        .evaluate(&request)
        .await
        .unwrap();
    assert_eq!(
        result.to_json(),
        json!({"status": "SUCCEEDED", "output": {"score": 1}, "inspectedStateName": "FraudCheck"})
    );
}

// ──────────────────────────────────────
// Wire form
// ──────────────────────────────────────

#[tokio::test]
async fn wire_request_round_trip() {
    let raw = json!({
        "definition": order_machine().to_string(),
        "input": "{\"items\": [{\"id\": 1}, {\"id\": 2}]}",
        "stateName": "PackItems",
        "mockConfigurations": [
            {"stateName": "PackSingleItem", "mockOutput": "{\"status\": \"MOCK_PACKED\"}"}
        ]
    });
    let response = Evaluator::new().evaluate_json(&raw).await;
    assert_eq!(response["status"], json!("SUCCEEDED"));
    assert_eq!(response["inspectedStateName"], json!("PackItems"));
    assert_eq!(response["appliedMockNames"], json!(["PackSingleItem"]));
    assert_eq!(response["mapMocksApplied"], json!(["PackSingleItem"]));
    assert_eq!(
        response["output"]["packedItems"],
        json!([{"status": "MOCK_PACKED"}, {"status": "MOCK_PACKED"}])
    );
}

#[tokio::test]
async fn wire_request_errors_use_invalid_request_shape() {
    let missing_state = json!({
        "definition": order_machine(),
        "input": {},
        "stateName": "NoSuchState"
    });
    let response = statecheck_eval::evaluate_json(&missing_state).await;
    assert_eq!(response["status"], json!("INVALID_REQUEST"));
    assert_eq!(response["errorType"], json!("StateNotFound"));

    let bad_mock = json!({
        "definition": order_machine(),
        "stateName": "PackItems",
        "mockConfigurations": [{"stateName": "Ghost", "mockOutput": {}}]
    });
    let response = statecheck_eval::evaluate_json(&bad_mock).await;
    assert_eq!(response["errorType"], json!("InvalidMockConfiguration"));

    let bad_definition = json!({
        "definition": {"StartAt": "Missing", "States": {"A": {"Type": "Succeed"}}},
        "stateName": "A"
    });
    let response = statecheck_eval::evaluate_json(&bad_definition).await;
    assert_eq!(response["errorType"], json!("MalformedDefinition"));
}
