//! Inbound command payloads the facade accepts — the core's mirror of the
//! REST surface's request bodies, kept transport-agnostic so an HTTP layer
//! only has to deserialize into these.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::domain::run::{MultitaskStrategy, RunConfig};
use crate::ids::{AssistantId, ThreadId};

pub struct CreateRunCommand {
    pub thread_id: ThreadId,
    pub assistant_id: AssistantId,
    pub input: Value,
    pub config: RunConfig,
    pub multitask_strategy: MultitaskStrategy,
}

pub struct CancelRunCommand {
    pub run_id: crate::ids::RunId,
    pub reason: Option<String>,
}

pub struct ResumeRunCommand {
    pub run_id: crate::ids::RunId,
    pub tool_outputs: FxHashMap<String, Value>,
}

pub struct ForkThreadCommand {
    pub thread_id: ThreadId,
    pub from_checkpoint_id: crate::ids::CheckpointId,
}
