//! The append-only event envelope every aggregate's history is made of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ids::EventId;

/// One row in the event store. Never mutated or deleted once written;
/// `(aggregate_type, aggregate_id, aggregate_version)` is unique and is the
/// optimistic-concurrency token aggregates append under.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: EventId,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_version: u64,
    pub event_type: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl DomainEvent {
    #[must_use]
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        aggregate_version: u64,
        event_type: impl Into<String>,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            aggregate_version,
            event_type: event_type.into(),
            payload,
            occurred_at: now,
            metadata: Value::Null,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
