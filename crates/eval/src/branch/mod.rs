//! Branch executor.
//!
//! Evaluates state nodes against input documents, applying mocks
//! transparently, and walks `Next` links through a graph. Map iterations and
//! Parallel branches are driven as concurrent futures over the same
//! immutable definition, registry and executor; their results are re-ordered
//! by declaration index before anything observable is produced.
//!
//! Domain failures travel as [`StateFailure`] values. The originating state
//! sets `state_path`; containers only append partial results on the way up.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};

use crate::choice::first_match;
use crate::config::EvalConfig;
use crate::datapath::{
    apply_input_path, apply_output_path, apply_result, effective_input, lookup, render_template,
    select, DataPathError,
};
use crate::mock::{AppliedMocks, MockOutcome, MockRegistry};
use crate::task::{TaskError, TaskExecutor};
use crate::types::choice::parse_timestamp;
use crate::types::{
    error_codes, ChoiceBranch, FailSpec, MapSpec, PartialResult, StateFailure, StateGraph,
    StateKind, StateNode, TaskSpec, WaitSpec,
};

// ──────────────────────────────────────────────
// Evaluation scope
// ──────────────────────────────────────────────

/// Everything a state evaluation borrows for the duration of one call.
pub struct Scope<'a> {
    pub mocks: &'a MockRegistry,
    pub executor: Option<&'a dyn TaskExecutor>,
    pub config: &'a EvalConfig,
    /// The request input, exposed as `$$.Execution.Input`.
    pub execution_input: &'a Value,
}

// ──────────────────────────────────────────────
// Result types
// ──────────────────────────────────────────────

/// Output of one evaluated state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateOutput {
    pub output: Value,
    /// `Next` for ordinary states, the matched target for Choice, `None`
    /// for terminal states.
    pub next_state: Option<String>,
}

/// Record of a single state visited during a walk.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub state_path: String,
    pub state_type: &'static str,
    pub next_state: Option<String>,
}

/// Result of a successful walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkResult {
    pub output: Value,
    /// Where the walk would continue; only set when a single state was run.
    pub next_state: Option<String>,
    pub steps: Vec<StepRecord>,
}

// ──────────────────────────────────────────────
// Entry points
// ──────────────────────────────────────────────

/// Evaluate exactly one state. `segments` is its qualified path.
pub async fn run_single(
    scope: &Scope<'_>,
    node: &StateNode,
    segments: Vec<String>,
    input: Value,
    applied: &mut AppliedMocks,
) -> Result<WalkResult, StateFailure> {
    let state_path = segments.join(".");
    let out = run_state(scope, node, segments, input, false, applied).await?;
    Ok(WalkResult {
        output: out.output,
        next_state: out.next_state.clone(),
        steps: vec![StepRecord {
            state_path,
            state_type: node.state_type().as_str(),
            next_state: out.next_state,
        }],
    })
}

/// Walk `graph` from `start` until a state without a successor completes.
///
/// `container` is the qualified path of the state that owns `graph`, empty
/// for the root graph.
pub async fn walk(
    scope: &Scope<'_>,
    graph: &StateGraph,
    start: &str,
    container: &[String],
    input: Value,
    within_map: bool,
    applied: &mut AppliedMocks,
) -> Result<WalkResult, StateFailure> {
    let qualify = |name: &str| {
        let mut segments = container.to_vec();
        segments.push(name.to_string());
        segments
    };

    let mut current = graph.get(start).ok_or_else(|| {
        StateFailure::runtime(
            format!("state '{}' is not declared in this graph", start),
            qualify(start).join("."),
        )
    })?;
    let mut input = input;
    let mut steps: Vec<StepRecord> = Vec::new();

    loop {
        let segments = qualify(&current.name);
        let state_path = segments.join(".");
        if steps.len() >= scope.config.max_steps {
            return Err(StateFailure::runtime(
                format!("exceeded maximum step count ({})", scope.config.max_steps),
                state_path,
            ));
        }

        let out = run_state(scope, current, segments, input, within_map, applied).await?;
        steps.push(StepRecord {
            state_path: state_path.clone(),
            state_type: current.state_type().as_str(),
            next_state: out.next_state.clone(),
        });

        match out.next_state {
            Some(next) => {
                current = graph.get(&next).ok_or_else(|| {
                    StateFailure::runtime(
                        format!("next state '{}' is not declared in this graph", next),
                        state_path,
                    )
                })?;
                input = out.output;
            }
            None => {
                return Ok(WalkResult {
                    output: out.output,
                    next_state: None,
                    steps,
                })
            }
        }
    }
}

fn run_graph<'a, 'b>(
    scope: &'a Scope<'a>,
    graph: &'a StateGraph,
    container: Vec<String>,
    input: Value,
    within_map: bool,
    applied: &'b mut AppliedMocks,
) -> BoxFuture<'b, Result<Value, StateFailure>>
where
    'a: 'b,
{
    Box::pin(async move {
        let result = walk(
            scope,
            graph,
            &graph.start_at,
            &container,
            input,
            within_map,
            applied,
        )
        .await?;
        Ok(result.output)
    })
}

// ──────────────────────────────────────────────
// State dispatch
// ──────────────────────────────────────────────

/// Evaluate one node. Boxed because containers recurse through it.
pub fn run_state<'a, 'b>(
    scope: &'a Scope<'a>,
    node: &'a StateNode,
    segments: Vec<String>,
    input: Value,
    within_map: bool,
    applied: &'b mut AppliedMocks,
) -> BoxFuture<'b, Result<StateOutput, StateFailure>>
where
    'a: 'b,
{
    Box::pin(async move {
        let path = segments.join(".");
        tracing::debug!(state = %path, kind = node.state_type().as_str(), "evaluating state");

        let ctx = context(scope.execution_input, &node.name, None);
        let runtime = |e: DataPathError| StateFailure::runtime(e.to_string(), path.clone());

        let output = match &node.kind {
            StateKind::Task(task) => {
                let effective = effective_input(&node.io, &input, &ctx).map_err(runtime)?;
                let raw = match mock_for(scope, &segments, within_map, applied) {
                    Some(outcome) => mocked(outcome, &path)?,
                    None => run_task(scope, task, &effective, &path).await?,
                };
                apply_result(&node.io, &input, raw, &ctx).map_err(runtime)?
            }

            StateKind::Pass { result } => {
                let effective = effective_input(&node.io, &input, &ctx).map_err(runtime)?;
                let raw = result.clone().unwrap_or(effective);
                apply_result(&node.io, &input, raw, &ctx).map_err(runtime)?
            }

            StateKind::Wait(wait) => {
                let effective = apply_input_path(&node.io, &input, &ctx).map_err(runtime)?;
                check_wait(wait, &effective, &ctx)
                    .map_err(|cause| StateFailure::runtime(cause, path.clone()))?;
                apply_output_path(&node.io, effective, &ctx).map_err(runtime)?
            }

            StateKind::Succeed => {
                let effective = apply_input_path(&node.io, &input, &ctx).map_err(runtime)?;
                let output = apply_output_path(&node.io, effective, &ctx).map_err(runtime)?;
                return Ok(StateOutput {
                    output,
                    next_state: None,
                });
            }

            StateKind::Fail(fail) => {
                return Err(match mock_for(scope, &segments, within_map, applied) {
                    Some(MockOutcome::Failure { error, cause }) => {
                        StateFailure::new(error.clone(), cause.clone(), path.clone())
                    }
                    _ => fail_state(fail, &input, &ctx, &path)?,
                });
            }

            StateKind::Choice { choices, default } => {
                return run_choice(choices, default.as_deref(), node, &input, &ctx, &path);
            }

            StateKind::Map(map) => {
                let effective = apply_input_path(&node.io, &input, &ctx).map_err(runtime)?;
                let raw = match mock_for(scope, &segments, within_map, applied) {
                    Some(outcome) => mocked(outcome, &path)?,
                    None => run_map(scope, node, map, &segments, &effective, applied).await?,
                };
                apply_result(&node.io, &input, raw, &ctx).map_err(runtime)?
            }

            StateKind::Parallel { branches } => {
                let effective = effective_input(&node.io, &input, &ctx).map_err(runtime)?;
                let raw = match mock_for(scope, &segments, within_map, applied) {
                    Some(outcome) => mocked(outcome, &path)?,
                    None => {
                        let units = branches
                            .iter()
                            .map(|graph| Unit {
                                id: graph.start_at.clone(),
                                graph,
                                input: effective.clone(),
                            })
                            .collect();
                        let limit = scope.config.concurrency_for(0, branches.len());
                        Value::Array(fan_out(scope, &segments, units, limit, within_map, applied).await?)
                    }
                };
                apply_result(&node.io, &input, raw, &ctx).map_err(runtime)?
            }
        };

        Ok(StateOutput {
            output,
            next_state: node.next.clone(),
        })
    })
}

/// The context object (`$$`) seen by one state.
fn context(execution_input: &Value, state_name: &str, item: Option<(usize, &Value)>) -> Value {
    let mut ctx = json!({
        "Execution": { "Input": execution_input },
        "State": { "Name": state_name },
    });
    if let (Some((index, value)), Value::Object(fields)) = (item, &mut ctx) {
        fields.insert(
            "Map".to_string(),
            json!({ "Item": { "Index": index, "Value": value } }),
        );
    }
    ctx
}

// ──────────────────────────────────────────────
// Mocks
// ──────────────────────────────────────────────

fn mock_for<'a>(
    scope: &Scope<'a>,
    segments: &[String],
    within_map: bool,
    applied: &mut AppliedMocks,
) -> Option<&'a MockOutcome> {
    let mocks: &'a MockRegistry = scope.mocks;
    let (name, outcome) = mocks.lookup(segments)?;
    tracing::debug!(state = %segments.join("."), mock = name, "applying mock");
    applied.record(name, within_map);
    Some(outcome)
}

fn mocked(outcome: &MockOutcome, path: &str) -> Result<Value, StateFailure> {
    match outcome {
        MockOutcome::Output(v) => Ok(v.clone()),
        MockOutcome::Failure { error, cause } => {
            Err(StateFailure::new(error.clone(), cause.clone(), path))
        }
    }
}

// ──────────────────────────────────────────────
// Per-kind evaluation
// ──────────────────────────────────────────────

async fn run_task(
    scope: &Scope<'_>,
    task: &TaskSpec,
    input: &Value,
    path: &str,
) -> Result<Value, StateFailure> {
    let Some(executor) = scope.executor else {
        return Err(StateFailure::new(
            error_codes::TASK_FAILED,
            format!("no task executor is configured for resource '{}'", task.resource),
            path,
        ));
    };

    let limit = scope.config.task_timeout(task.timeout_seconds);
    match tokio::time::timeout(limit, executor.execute(task, input)).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(TaskError::Failed { error, cause })) => Err(StateFailure::new(error, cause, path)),
        Ok(Err(e @ TaskError::Unavailable { .. })) => {
            tracing::warn!(state = %path, resource = %task.resource, error = %e, "task executor unavailable");
            Err(StateFailure::new(error_codes::TASK_FAILED, e.to_string(), path))
        }
        Err(_) => {
            tracing::warn!(state = %path, resource = %task.resource, timeout = ?limit, "task timed out");
            Err(StateFailure::new(
                error_codes::TIMEOUT,
                format!("task did not complete within {}s", limit.as_secs()),
                path,
            ))
        }
    }
}

fn run_choice(
    choices: &[ChoiceBranch],
    default: Option<&str>,
    node: &StateNode,
    input: &Value,
    ctx: &Value,
    path: &str,
) -> Result<StateOutput, StateFailure> {
    let runtime = |e: DataPathError| StateFailure::runtime(e.to_string(), path);
    let effective = apply_input_path(&node.io, input, ctx).map_err(runtime)?;
    let target = match first_match(choices, &effective, ctx).map_err(runtime)? {
        Some(next) => next,
        None => default.ok_or_else(|| {
            StateFailure::new(
                error_codes::NO_CHOICE_MATCHED,
                "no choice rule matched and no Default is declared",
                path,
            )
        })?,
    };
    let output = apply_output_path(&node.io, effective, ctx).map_err(runtime)?;
    Ok(StateOutput {
        output,
        next_state: Some(target.to_string()),
    })
}

/// Wait never sleeps, but its dynamic duration must still resolve.
fn check_wait(wait: &WaitSpec, input: &Value, ctx: &Value) -> Result<(), String> {
    match wait {
        WaitSpec::Seconds(_) | WaitSpec::Timestamp(_) => Ok(()),
        WaitSpec::SecondsPath(p) => match lookup(p, input, ctx).map_err(|e| e.to_string())? {
            Some(v) if v.as_u64().is_some() => Ok(()),
            Some(_) => Err(format!("SecondsPath '{}' is not a non-negative integer", p)),
            None => Err(format!("SecondsPath '{}' selected nothing", p)),
        },
        WaitSpec::TimestampPath(p) => match lookup(p, input, ctx).map_err(|e| e.to_string())? {
            Some(v) if v.as_str().and_then(parse_timestamp).is_some() => Ok(()),
            Some(_) => Err(format!("TimestampPath '{}' is not an RFC 3339 timestamp", p)),
            None => Err(format!("TimestampPath '{}' selected nothing", p)),
        },
    }
}

fn fail_state(
    fail: &FailSpec,
    input: &Value,
    ctx: &Value,
    path: &str,
) -> Result<StateFailure, StateFailure> {
    let dynamic = |p: &str| -> Result<String, StateFailure> {
        match select(p, input, ctx) {
            Ok(Value::String(s)) => Ok(s.clone()),
            Ok(other) => Ok(other.to_string()),
            Err(e) => Err(StateFailure::runtime(e.to_string(), path)),
        }
    };
    let error = match (&fail.error_path, &fail.error) {
        (Some(p), _) => dynamic(p)?,
        (None, Some(e)) => e.clone(),
        (None, None) => String::new(),
    };
    let cause = match (&fail.cause_path, &fail.cause) {
        (Some(p), _) => dynamic(p)?,
        (None, Some(c)) => c.clone(),
        (None, None) => String::new(),
    };
    Ok(StateFailure::new(error, cause, path))
}

async fn run_map(
    scope: &Scope<'_>,
    node: &StateNode,
    map: &MapSpec,
    segments: &[String],
    input: &Value,
    applied: &mut AppliedMocks,
) -> Result<Value, StateFailure> {
    let path = segments.join(".");
    let runtime = |e: DataPathError| StateFailure::runtime(e.to_string(), path.clone());
    let ctx = context(scope.execution_input, &node.name, None);

    let items = match select(&map.items_path, input, &ctx).map_err(runtime)? {
        Value::Array(items) => items,
        other => {
            return Err(StateFailure::runtime(
                format!(
                    "ItemsPath '{}' selected {} instead of an array",
                    map.items_path,
                    kind_of(other)
                ),
                path.as_str(),
            ))
        }
    };

    let mut units = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item_input = match &map.item_selector {
            Some(selector) => {
                let item_ctx = context(scope.execution_input, &node.name, Some((index, item)));
                render_template(selector, input, &item_ctx).map_err(runtime)?
            }
            None => item.clone(),
        };
        units.push(Unit {
            id: index.to_string(),
            graph: &map.iterator,
            input: item_input,
        });
    }

    let limit = scope.config.concurrency_for(map.max_concurrency, units.len());
    let outputs = fan_out(scope, segments, units, limit, true, applied).await?;
    Ok(Value::Array(outputs))
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ──────────────────────────────────────────────
// Fan-out
// ──────────────────────────────────────────────

/// One Map iteration or Parallel branch.
struct Unit<'a> {
    /// Branch `StartAt` for Parallel, item index for Map.
    id: String,
    graph: &'a StateGraph,
    input: Value,
}

/// Run `units` with at most `limit` in flight; outputs in declaration order.
///
/// The first failure drops every unfinished unit. Units that completed
/// before it are attached to the failure as partial results.
async fn fan_out<'a>(
    scope: &'a Scope<'a>,
    container: &[String],
    units: Vec<Unit<'a>>,
    limit: usize,
    within_map: bool,
    applied: &mut AppliedMocks,
) -> Result<Vec<Value>, StateFailure> {
    let total = units.len();
    let ids: Vec<String> = units.iter().map(|u| u.id.clone()).collect();
    let mut outputs: Vec<Option<Value>> = vec![None; total];
    let mut records: Vec<AppliedMocks> = vec![AppliedMocks::new(); total];

    let launch = |index: usize, unit: Unit<'a>| {
        let container = container.to_vec();
        async move {
            let mut local = AppliedMocks::new();
            let result = run_graph(scope, unit.graph, container, unit.input, within_map, &mut local).await;
            (index, result, local)
        }
    };

    let mut pending = units.into_iter().enumerate();
    let mut running = FuturesUnordered::new();
    for (index, unit) in pending.by_ref().take(limit.max(1)) {
        running.push(launch(index, unit));
    }

    let mut failure: Option<StateFailure> = None;
    while let Some((index, result, local)) = running.next().await {
        records[index] = local;
        match result {
            Ok(output) => {
                outputs[index] = Some(output);
                if let Some((next, unit)) = pending.next() {
                    running.push(launch(next, unit));
                }
            }
            Err(f) => {
                failure = Some(f);
                break;
            }
        }
    }
    // Dropping the stream abandons whatever is still in flight.
    drop(running);

    for record in records {
        applied.merge(record);
    }

    if let Some(mut failure) = failure {
        let container_path = container.join(".");
        let completed: Vec<PartialResult> = outputs
            .into_iter()
            .zip(ids)
            .filter_map(|(output, branch)| {
                output.map(|output| PartialResult {
                    container: container_path.clone(),
                    branch,
                    output,
                })
            })
            .collect();
        tracing::debug!(
            container = %container_path,
            failed_at = %failure.state_path,
            completed = completed.len(),
            "aborting container after branch failure"
        );
        failure.partial_results.extend(completed);
        return Err(failure);
    }

    Ok(outputs.into_iter().flatten().collect())
}
