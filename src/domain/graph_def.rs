//! Graph definitions: the data-driven shape clients upload, as opposed to
//! `graphs::GraphBuilder`'s Rust-closure-based compile-time graphs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::condition::Condition;
use crate::ids::GraphId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Input,
    Output,
    Llm,
    Tool,
    Router,
    Human,
    Subgraph,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    pub node_type: NodeType,
    pub config: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeDef {
    pub source: String,
    pub target: String,
    /// `None` means unconditional. An explicit `Condition::Always` is also
    /// treated as unconditional by the engine's edge evaluation.
    pub condition: Option<Condition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub id: GraphId,
    pub entry_point: String,
    pub nodes: Vec<NodeDef>,
    pub edges: Vec<EdgeDef>,
}

impl GraphDefinition {
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[must_use]
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&EdgeDef> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    /// Whether any cycle reachable from `entry_point` passes only through
    /// router nodes — the one shape of cycle this graph model allows.
    /// Walks the edge list rather than doing full cycle detection: for every
    /// edge that closes a back-reference (target already on the current
    /// path), the source must be a router node.
    #[must_use]
    pub fn cycles_go_through_routers(&self) -> bool {
        fn visit<'a>(
            graph: &'a GraphDefinition,
            node_id: &str,
            path: &mut Vec<&'a str>,
            ok: &mut bool,
        ) {
            if path.contains(&node_id) {
                let source_is_router = path
                    .last()
                    .and_then(|last| graph.node(last))
                    .is_some_and(|n| n.node_type == NodeType::Router);
                if !source_is_router {
                    *ok = false;
                }
                return;
            }
            path.push(node_id);
            for edge in graph.outgoing_edges(node_id) {
                visit(graph, &edge.target, path, ok);
                if !*ok {
                    return;
                }
            }
            path.pop();
        }

        let mut ok = true;
        let mut path = Vec::new();
        visit(self, &self.entry_point, &mut path, &mut ok);
        ok
    }
}
