//! The consumer-facing event vocabulary the streaming bridge translates
//! domain events into, one step removed from the internal `DomainEvent`
//! envelope and the SSE wire frame it eventually becomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EventId, RunId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    RunStarted,
    NodeStart,
    NodeEnd,
    Values,
    MessageChunk,
    Message,
    Updates,
    Debug,
    End,
    Error,
    RunCompleted,
    RunFailed,
    RequiresAction,
}

impl StreamEventKind {
    /// The literal SSE `event:` field value.
    #[must_use]
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::NodeStart => "node_start",
            Self::NodeEnd => "node_end",
            Self::Values => "values",
            Self::MessageChunk => "message_chunk",
            Self::Message => "message",
            Self::Updates => "updates",
            Self::Debug => "debug",
            Self::End => "end",
            Self::Error => "error",
            Self::RunCompleted => "run_completed",
            Self::RunFailed => "run_failed",
            Self::RequiresAction => "requires_action",
        }
    }

    /// Does this kind terminate the run from the subscriber's point of view?
    /// The fan-out appends its own `end` frame after observing one of these.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::RunCompleted | Self::RunFailed)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_id: EventId,
    pub run_id: RunId,
    pub kind: StreamEventKind,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl StreamEvent {
    #[must_use]
    pub fn new(run_id: RunId, kind: StreamEventKind, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            event_id: EventId::new(),
            run_id,
            kind,
            payload,
            occurred_at: now,
        }
    }
}
