//! The thread aggregate: conversation container and "live" channel-values.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ThreadId;
use crate::message::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Idle,
    Busy,
    Interrupted,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub status: ThreadStatus,
    pub values: FxHashMap<String, Value>,
    pub messages: Vec<Message>,
    pub metadata: FxHashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: ThreadId::new(),
            status: ThreadStatus::Idle,
            values: FxHashMap::default(),
            messages: Vec::new(),
            metadata: FxHashMap::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a new run may be created without tripping the
    /// at-most-one-in-flight-run invariant (enforced for real at the
    /// repository layer via a conditional insert; this is the in-memory
    /// mirror of that check used by tests and the enqueue path).
    #[must_use]
    pub fn accepts_new_run(&self) -> bool {
        matches!(self.status, ThreadStatus::Idle | ThreadStatus::Error)
    }

    pub fn mark_busy(&mut self, now: DateTime<Utc>) {
        self.status = ThreadStatus::Busy;
        self.updated_at = now;
    }

    pub fn mark_idle(&mut self, now: DateTime<Utc>) {
        self.status = ThreadStatus::Idle;
        self.updated_at = now;
    }

    pub fn mark_interrupted(&mut self, now: DateTime<Utc>) {
        self.status = ThreadStatus::Interrupted;
        self.updated_at = now;
    }
}
