//! Interrupts: the paused-for-human/tool-output state a run can sit in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{InterruptId, RunId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    ToolCall,
    ApprovalRequired,
    InputNeeded,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: InterruptId,
    pub run_id: RunId,
    pub node_id: String,
    pub reason: InterruptReason,
    /// Channel-values snapshot at the moment the node paused.
    pub state: Value,
    /// Present when `reason == ToolCall`; the calls awaiting output.
    pub tool_calls: Vec<Value>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Interrupt {
    #[must_use]
    pub fn new(
        run_id: RunId,
        node_id: impl Into<String>,
        reason: InterruptReason,
        state: Value,
        tool_calls: Vec<Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InterruptId::new(),
            run_id,
            node_id: node_id.into(),
            reason,
            state,
            tool_calls,
            resolved: false,
            resolved_at: None,
            created_at: now,
        }
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_interrupt_starts_unresolved() {
        let interrupt = Interrupt::new(
            RunId::new(),
            "tool_node",
            InterruptReason::ToolCall,
            json!({}),
            vec![json!({"id": "call_1"})],
            Utc::now(),
        );
        assert!(!interrupt.resolved);
        assert!(interrupt.resolved_at.is_none());
    }

    #[test]
    fn resolve_sets_resolved_and_timestamp() {
        let mut interrupt = Interrupt::new(
            RunId::new(),
            "tool_node",
            InterruptReason::ApprovalRequired,
            json!({}),
            vec![],
            Utc::now(),
        );
        let now = Utc::now();
        interrupt.resolve(now);
        assert!(interrupt.resolved);
        assert_eq!(interrupt.resolved_at, Some(now));
    }
}
