//! The cooperative step driver: one node dispatch + edge evaluation per call.
//!
//! Modeled as an explicit function returning one of four outcomes rather than
//! as an `async` loop the language runtime suspends — the runtime loop, not a
//! coroutine, decides when to yield, so a run can be paused and resumed
//! across process restarts by simply calling `step` again against the
//! reloaded checkpoint.

use serde_json::Value;

use crate::domain::graph_def::{GraphDefinition, NodeType};
use crate::engine::executor::{ExecutorRegistry, InterruptRequest};
use crate::errors::RunError;

/// What the engine loop should do after one `step` call.
pub enum StepOutcome {
    /// Dispatch succeeded; route to the named next node.
    NextStep {
        node_id: String,
        channel_values: Value,
    },
    /// The node's executor asked to pause.
    Pause {
        node_id: String,
        channel_values: Value,
        interrupt: InterruptRequest,
    },
    /// A terminal (`output`, or no outgoing edges) node completed.
    Done { channel_values: Value },
    /// Dispatch or routing failed; the run should transition to `error`.
    Fail(RunError),
}

/// Execute `node_id` against `channel_values` and determine the next hop.
///
/// `nodes_executed`/`recursion_limit` gate `MaxIterationsExceeded` the same
/// way `domain::run::Run::record_node_started` does, so callers that also
/// drive the run aggregate see consistent failures from either side.
pub async fn step(
    graph: &GraphDefinition,
    executors: &ExecutorRegistry,
    node_id: &str,
    mut channel_values: Value,
    nodes_executed: u64,
    recursion_limit: u64,
) -> StepOutcome {
    if nodes_executed >= recursion_limit {
        return StepOutcome::Fail(RunError::MaxIterationsExceeded {
            steps: nodes_executed,
            limit: recursion_limit,
        });
    }

    let Some(node) = graph.node(node_id) else {
        return StepOutcome::Fail(RunError::not_found("node", node_id));
    };

    let Some(executor) = executors.resolve(node.node_type) else {
        return StepOutcome::Fail(RunError::internal(format!(
            "no executor registered for node type {:?}",
            node.node_type
        )));
    };

    let outcome = match executor.invoke(node_id, &node.config, &channel_values).await {
        Ok(outcome) => outcome,
        Err(err) => return StepOutcome::Fail(err),
    };

    if !channel_values.is_object() {
        channel_values = Value::Object(Default::default());
    }
    let map = channel_values.as_object_mut().expect("coerced to object above");
    for (channel, value) in &outcome.updates {
        map.insert(channel.clone(), value.clone());
    }

    if let Some(interrupt) = outcome.interrupt {
        return StepOutcome::Pause {
            node_id: node_id.to_string(),
            channel_values,
            interrupt,
        };
    }

    let outgoing = graph.outgoing_edges(node_id);
    if node.node_type == NodeType::Output || outgoing.is_empty() {
        return StepOutcome::Done { channel_values };
    }

    let matches: Vec<&str> = outgoing
        .iter()
        .filter(|edge| {
            edge.condition
                .as_ref()
                .is_none_or(|cond| cond.evaluate(&channel_values))
        })
        .map(|edge| edge.target.as_str())
        .collect();

    match matches.as_slice() {
        [] => StepOutcome::Fail(RunError::NoMatchingEdge {
            node: node_id.to_string(),
        }),
        [single] => StepOutcome::NextStep {
            node_id: (*single).to_string(),
            channel_values,
        },
        multiple => StepOutcome::Fail(RunError::RoutingAmbiguous {
            node: node_id.to_string(),
            candidates: multiple.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph_def::{EdgeDef, NodeDef};
    use crate::engine::condition::Condition;
    use crate::engine::executor::{EchoRouterExecutor, PassthroughExecutor};
    use crate::ids::GraphId;
    use serde_json::json;
    use std::sync::Arc;

    fn branching_graph() -> GraphDefinition {
        GraphDefinition {
            id: GraphId::new(),
            entry_point: "classify".to_string(),
            nodes: vec![
                NodeDef {
                    id: "classify".to_string(),
                    node_type: NodeType::Router,
                    config: json!({}),
                },
                NodeDef {
                    id: "path_a".to_string(),
                    node_type: NodeType::Output,
                    config: json!({}),
                },
                NodeDef {
                    id: "path_b".to_string(),
                    node_type: NodeType::Output,
                    config: json!({}),
                },
            ],
            edges: vec![
                EdgeDef {
                    source: "classify".to_string(),
                    target: "path_a".to_string(),
                    condition: Some(Condition::Eq {
                        path: "category".to_string(),
                        value: json!("A"),
                    }),
                },
                EdgeDef {
                    source: "classify".to_string(),
                    target: "path_b".to_string(),
                    condition: Some(Condition::Eq {
                        path: "category".to_string(),
                        value: json!("B"),
                    }),
                },
            ],
        }
    }

    fn registry() -> ExecutorRegistry {
        let mut registry = ExecutorRegistry::new();
        registry.register(
            NodeType::Router,
            Arc::new(EchoRouterExecutor {
                field: "category".to_string(),
            }),
        );
        registry.register(
            NodeType::Output,
            Arc::new(PassthroughExecutor::new("output", "result")),
        );
        registry
    }

    #[tokio::test]
    async fn routes_to_matching_branch() {
        let graph = branching_graph();
        let registry = registry();
        let outcome = step(
            &graph,
            &registry,
            "classify",
            json!({"category": "A"}),
            0,
            25,
        )
        .await;
        match outcome {
            StepOutcome::NextStep { node_id, .. } => assert_eq!(node_id, "path_a"),
            _ => panic!("expected NextStep"),
        }
    }

    #[tokio::test]
    async fn no_matching_branch_fails_run() {
        let graph = branching_graph();
        let registry = registry();
        let outcome = step(
            &graph,
            &registry,
            "classify",
            json!({"category": "C"}),
            0,
            25,
        )
        .await;
        assert!(matches!(
            outcome,
            StepOutcome::Fail(RunError::NoMatchingEdge { .. })
        ));
    }

    #[tokio::test]
    async fn recursion_limit_fails_before_dispatch() {
        let graph = branching_graph();
        let registry = registry();
        let outcome = step(&graph, &registry, "classify", json!({}), 3, 3).await;
        assert!(matches!(
            outcome,
            StepOutcome::Fail(RunError::MaxIterationsExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn output_node_terminates() {
        let graph = branching_graph();
        let registry = registry();
        let outcome = step(&graph, &registry, "path_a", json!({}), 1, 25).await;
        assert!(matches!(outcome, StepOutcome::Done { .. }));
    }
}
