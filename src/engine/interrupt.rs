//! Resume-with-tool-outputs: the four-step protocol from an unresolved
//! interrupt back into a running engine loop.
//!
//! This module only computes the *next state*; persisting it (new
//! checkpoint row, interrupt update, run event, in one transaction) is
//! `store::repository`'s job, the same split `domain::run::Run` keeps
//! between "what changes" and "how it's written down".

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::domain::interrupt::Interrupt;
use crate::domain::run::{Run, RunEvent};
use crate::errors::RunError;

/// Result of resolving an interrupt: the updated interrupt record, the
/// resumed run plus its `RunResumed` event, and the channel-values the
/// pending node would have produced, ready to become a new checkpoint.
pub struct ResumeOutcome {
    pub interrupt: Interrupt,
    pub run: Run,
    pub run_event: RunEvent,
    pub channel_values: Value,
}

/// `ResumeWithToolOutputs(run_id, outputs)`.
///
/// 1. Rejects if `interrupt` is already resolved or doesn't belong to `run`.
/// 2. Merges `tool_outputs` into the interrupt's captured state as if the
///    paused node had produced them.
/// 3. Marks the interrupt resolved.
/// 4. Resumes the run (`requires_action` → `running`).
///
/// Re-entering the engine loop from the merged checkpoint is the caller's
/// job — this function only produces the values that checkpoint needs.
pub fn resume_with_tool_outputs(
    interrupt: &Interrupt,
    run: &Run,
    tool_outputs: FxHashMap<String, Value>,
    now: DateTime<Utc>,
) -> Result<ResumeOutcome, RunError> {
    if interrupt.resolved {
        return Err(RunError::InvalidState(format!(
            "interrupt {} is already resolved",
            interrupt.id
        )));
    }
    if interrupt.run_id != run.id {
        return Err(RunError::InvalidState(format!(
            "interrupt {} does not belong to run {}",
            interrupt.id, run.id
        )));
    }

    let mut channel_values = interrupt.state.clone();
    if !channel_values.is_object() {
        channel_values = Value::Object(Default::default());
    }
    let map = channel_values
        .as_object_mut()
        .expect("coerced to object above");
    for (channel, value) in tool_outputs {
        map.insert(channel, value);
    }

    let mut resolved_interrupt = interrupt.clone();
    resolved_interrupt.resolve(now);

    let (run, run_event) = run.resume(now)?;

    Ok(ResumeOutcome {
        interrupt: resolved_interrupt,
        run,
        run_event,
        channel_values,
    })
}
