//! Thread checkpoints: immutable, tree-structured state snapshots.
//!
//! Distinct from `runtimes::checkpointer::Checkpoint`, which snapshots an
//! in-process scheduler session for local resumption. This `Checkpoint` is
//! the durable, per-thread aggregate from the data model: versioned,
//! parent-chained, and queryable independently of any running process.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CheckpointId, ThreadId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub thread_id: ThreadId,
    pub namespace: String,
    /// Monotonic within (thread_id, namespace).
    pub checkpoint_number: u64,
    pub parent_id: Option<CheckpointId>,
    pub channel_values: Value,
    pub channel_versions: FxHashMap<String, u64>,
    /// Per-task versions-seen, for replay determinism: mirrors
    /// `schedulers::SchedulerState::versions_seen` at the moment this
    /// checkpoint was taken.
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
    pub pending_sends: Vec<Value>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        thread_id: ThreadId,
        namespace: impl Into<String>,
        checkpoint_number: u64,
        parent_id: Option<CheckpointId>,
        channel_values: Value,
        channel_versions: FxHashMap<String, u64>,
        versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CheckpointId::new(),
            thread_id,
            namespace: namespace.into(),
            checkpoint_number,
            parent_id,
            channel_values,
            channel_versions,
            versions_seen,
            pending_sends: Vec::new(),
            created_at: now,
        }
    }

    /// Build the next checkpoint in this chain: same thread and namespace,
    /// this checkpoint as parent, number advanced by one.
    #[must_use]
    pub fn fork(
        &self,
        channel_values: Value,
        channel_versions: FxHashMap<String, u64>,
        versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            self.thread_id,
            self.namespace.clone(),
            self.checkpoint_number + 1,
            Some(self.id),
            channel_values,
            channel_versions,
            versions_seen,
            now,
        )
    }
}

/// A single channel write ordered by (task, index) under a checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointWrite {
    pub checkpoint_id: CheckpointId,
    pub task: String,
    pub index: u32,
    pub channel: String,
    pub write_type: WriteType,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteType {
    Put,
    Append,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn fork_advances_number_and_parents_on_self() {
        let root = Checkpoint::new(
            ThreadId::new(),
            "",
            0,
            None,
            json!({}),
            FxHashMap::default(),
            FxHashMap::default(),
            now(),
        );
        let child = root.fork(json!({"k": 1}), FxHashMap::default(), FxHashMap::default(), now());

        assert_eq!(child.checkpoint_number, 1);
        assert_eq!(child.parent_id, Some(root.id));
        assert_eq!(child.thread_id, root.thread_id);
        assert_eq!(child.namespace, root.namespace);
        assert_eq!(child.channel_values, json!({"k": 1}));
    }
}
