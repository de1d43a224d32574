//! Assistants: reusable, versioned configuration pointing at a graph.
//!
//! Versions are append-only rows, never mutated in place — the same
//! discipline the event store uses — with a separate `latest_version`
//! pointer on the assistant itself so callers resolve "current config"
//! without scanning history.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ids::{AssistantId, GraphId};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Assistant {
    pub id: AssistantId,
    pub name: String,
    pub graph_id: GraphId,
    pub latest_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AssistantVersion {
    pub assistant_id: AssistantId,
    pub version: u32,
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

impl Assistant {
    #[must_use]
    pub fn new(name: impl Into<String>, graph_id: GraphId, now: DateTime<Utc>) -> Self {
        Self {
            id: AssistantId::new(),
            name: name.into(),
            graph_id,
            latest_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a new immutable version row and advance `latest_version`.
    #[must_use]
    pub fn create_version(&self, config: Value, now: DateTime<Utc>) -> (Assistant, AssistantVersion) {
        let version = self.latest_version + 1;
        let mut next = self.clone();
        next.latest_version = version;
        next.updated_at = now;
        let row = AssistantVersion {
            assistant_id: self.id,
            version,
            config,
            created_at: now,
        };
        (next, row)
    }
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
    fn new_assistant_starts_at_version_zero() {
        let assistant = Assistant::new("support-bot", GraphId::new(), now());
        assert_eq!(assistant.latest_version, 0);
    }

    #[test]
    fn create_version_advances_latest_version_and_keeps_identity() {
        let assistant = Assistant::new("support-bot", GraphId::new(), now());
        let (updated, v1) = assistant.create_version(json!({"model": "x"}), now());
        assert_eq!(updated.latest_version, 1);
        assert_eq!(v1.version, 1);
        assert_eq!(v1.assistant_id, assistant.id);

        let (updated, v2) = updated.create_version(json!({"model": "y"}), now());
        assert_eq!(updated.latest_version, 2);
        assert_eq!(v2.version, 2);
    }
}
