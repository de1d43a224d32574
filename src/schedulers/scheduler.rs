use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::event_bus::EventEmitter;
use crate::node::{Node, NodeContext, NodeError, NodePartial};
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Per-node bookkeeping the scheduler uses to decide whether a node needs to
/// run again: the message/extra channel versions it last observed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// `node label -> { channel name -> last-seen version }`.
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
}

/// Outcome of running one superstep over a frontier.
///
/// `ran_nodes` preserves frontier order; `outputs` does not (nodes run
/// concurrently and report back in completion order).
#[derive(Debug, Clone, Default)]
pub struct StepRunResult {
    pub ran_nodes: Vec<NodeKind>,
    pub skipped_nodes: Vec<NodeKind>,
    pub outputs: Vec<(NodeKind, NodePartial)>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("node {kind} failed at step {step}")]
    #[diagnostic(code(weavegraph::schedulers::node_run))]
    NodeRun {
        kind: String,
        step: u64,
        #[source]
        source: NodeError,
    },

    #[error("scheduler task join error: {0}")]
    #[diagnostic(code(weavegraph::schedulers::join))]
    Join(#[from] tokio::task::JoinError),
}

/// Drives concurrent execution of a single superstep.
///
/// `concurrency_limit` bounds how many nodes in the frontier may run at
/// once via a `tokio::sync::Semaphore`; it does not bound total frontier
/// size, only in-flight node tasks.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pub concurrency_limit: usize,
}

impl Scheduler {
    #[must_use]
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// Whether `id` needs to run given the current snapshot's channel
    /// versions compared against the last-recorded versions for `id`.
    ///
    /// A node with no recorded history always runs. End nodes are gated the
    /// same way as any other node; it's the caller's responsibility to skip
    /// `NodeKind::End` entirely (superstep does this).
    #[must_use]
    pub fn should_run(&self, state: &SchedulerState, id: &str, snapshot: &StateSnapshot) -> bool {
        match state.versions_seen.get(id) {
            None => true,
            Some(seen) => {
                let messages_seen = seen.get("messages").copied().unwrap_or(0);
                let extra_seen = seen.get("extra").copied().unwrap_or(0);
                u64::from(snapshot.messages_version) > messages_seen
                    || u64::from(snapshot.extra_version) > extra_seen
            }
        }
    }

    /// Record the channel versions `id` has now observed.
    pub fn record_seen(&self, state: &mut SchedulerState, id: &str, snapshot: &StateSnapshot) {
        let entry = state.versions_seen.entry(id.to_string()).or_default();
        entry.insert("messages".to_string(), u64::from(snapshot.messages_version));
        entry.insert("extra".to_string(), u64::from(snapshot.extra_version));
    }

    /// Run one superstep: skip `End` nodes and version-gated nodes, run the
    /// rest concurrently (bounded by `concurrency_limit`), and join results.
    #[instrument(skip(self, state, nodes, snapshot, emitter), err)]
    pub async fn superstep(
        &self,
        state: &mut SchedulerState,
        nodes: &FxHashMap<NodeKind, Arc<dyn Node>>,
        frontier: Vec<NodeKind>,
        snapshot: StateSnapshot,
        step: u64,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<StepRunResult, SchedulerError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut ran_nodes = Vec::new();
        let mut skipped_nodes = Vec::new();
        let mut handles = Vec::new();

        for kind in frontier {
            if kind.is_end() {
                skipped_nodes.push(kind);
                continue;
            }

            let label = kind.encode();
            if !self.should_run(state, &label, &snapshot) {
                skipped_nodes.push(kind);
                continue;
            }
            self.record_seen(state, &label, &snapshot);

            let Some(node) = nodes.get(&kind).cloned() else {
                skipped_nodes.push(kind);
                continue;
            };

            ran_nodes.push(kind.clone());

            let permit = semaphore.clone();
            let snapshot = snapshot.clone();
            let emitter = emitter.clone();
            let node_id = kind.encode();
            let spawn_kind = kind.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                let ctx = NodeContext {
                    node_id,
                    step,
                    event_emitter: emitter,
                };
                let result = node.run(snapshot, ctx).await;
                (spawn_kind, result)
            }));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            let (kind, result) = handle.await?;
            match result {
                Ok(partial) => outputs.push((kind, partial)),
                Err(source) => {
                    return Err(SchedulerError::NodeRun {
                        kind: kind.encode(),
                        step,
                        source,
                    });
                }
            }
        }

        Ok(StepRunResult {
            ran_nodes,
            skipped_nodes,
            outputs,
        })
    }
}
