//! The run aggregate: lifecycle state machine and concurrency policy.
//!
//! Each public operation is a free function (not a `&mut self` method)
//! returning `Result<(Run, RunEvent), RunError>` so callers — the
//! `store::repository` layer — can persist `(new_state, event)` atomically
//! in one transaction, the same discipline `app::apply_barrier` uses to hand
//! back "what changed" rather than mutating hidden state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RunError;
use crate::ids::{AssistantId, GraphId, InterruptId, RunId, ThreadId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    RequiresAction,
    Success,
    Error,
    Cancelled,
    Timeout,
    /// A cancel request was issued, but the in-flight executor did not
    /// honour the cancellation signal before the engine yielded — the last
    /// node's outcome is recorded as `interrupted` rather than completed,
    /// distinguishing a forced stop from a clean `cancelled` run.
    Interrupted,
}

impl RunStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Error | Self::Cancelled | Self::Timeout | Self::Interrupted
        )
    }
}

/// Concurrency policy evaluated at `Create` time against any in-flight run
/// already on the target thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MultitaskStrategy {
    #[default]
    Reject,
    Interrupt,
    Rollback,
    Enqueue,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunErrorInfo {
    pub code: String,
    pub message: String,
    pub node: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequiredAction {
    pub interrupt_id: InterruptId,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub tags: Vec<String>,
    pub recursion_limit: u64,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            recursion_limit: 25,
            extra: HashMap::new(),
        }
    }
}

/// The run aggregate itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub thread_id: ThreadId,
    pub assistant_id: AssistantId,
    pub graph_id: Option<GraphId>,
    pub status: RunStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<RunErrorInfo>,
    pub required_action: Option<RequiredAction>,
    pub multitask_strategy: MultitaskStrategy,
    pub config: RunConfig,
    pub nodes_executed: u64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One domain event emitted per successful transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RunEvent {
    Created {
        thread_id: ThreadId,
        assistant_id: AssistantId,
        input: Value,
        multitask_strategy: MultitaskStrategy,
    },
    Started {
        graph_id: GraphId,
    },
    NodeStarted {
        node_id: String,
        attempt: u64,
    },
    NodeCompleted {
        node_id: String,
        output: Value,
        duration_ms: u64,
    },
    NodeSkipped {
        node_id: String,
        reason: String,
    },
    NodeFailed {
        node_id: String,
        error: String,
    },
    RequiresAction {
        interrupt_id: InterruptId,
        reason: String,
    },
    RunResumed,
    Completed {
        output: Value,
    },
    Failed {
        error: RunErrorInfo,
    },
    Cancelled {
        reason: Option<String>,
    },
    TimedOut,
    Interrupted {
        node_id: String,
    },
}

impl Run {
    /// `Create(thread, assistant, input, config, multitask_strategy)`.
    ///
    /// The multitask policy against any in-flight run on the same thread is
    /// evaluated by the caller (it needs a repository lookup); this
    /// constructor only builds the `pending` aggregate itself.
    #[must_use]
    pub fn create(
        thread_id: ThreadId,
        assistant_id: AssistantId,
        input: Value,
        config: RunConfig,
        multitask_strategy: MultitaskStrategy,
        now: DateTime<Utc>,
    ) -> (Run, RunEvent) {
        let run = Run {
            id: RunId::new(),
            thread_id,
            assistant_id,
            graph_id: None,
            status: RunStatus::Pending,
            input: input.clone(),
            output: None,
            error: None,
            required_action: None,
            multitask_strategy,
            config,
            nodes_executed: 0,
            version: 1,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        let event = RunEvent::Created {
            thread_id: run.thread_id,
            assistant_id: run.assistant_id,
            input,
            multitask_strategy,
        };
        (run, event)
    }

    fn transition(&self, now: DateTime<Utc>) -> Run {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = now;
        next
    }

    /// `Start()` — requires a resolved graph; a missing graph fails the run
    /// immediately (ending in `error`, never left `pending`).
    pub fn start(
        &self,
        graph_id: Option<GraphId>,
        now: DateTime<Utc>,
    ) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::Pending {
            return Err(invalid_state(self.status, "start"));
        }
        let Some(graph_id) = graph_id else {
            let (run, event) = self.fail(
                RunErrorInfo {
                    code: "no_graph_defined".to_string(),
                    message: "no graph defined".to_string(),
                    node: None,
                },
                now,
            )?;
            return Ok((run, event));
        };
        let mut next = self.transition(now);
        next.status = RunStatus::Running;
        next.graph_id = Some(graph_id);
        next.started_at = Some(now);
        Ok((next, RunEvent::Started { graph_id }))
    }

    pub fn record_node_started(
        &self,
        node_id: impl Into<String>,
        attempt: u64,
        now: DateTime<Utc>,
    ) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::Running {
            return Err(invalid_state(self.status, "record_node_started"));
        }
        let mut next = self.transition(now);
        next.nodes_executed += 1;
        if next.nodes_executed > next.config.recursion_limit {
            return next.fail_recursion(now);
        }
        Ok((
            next,
            RunEvent::NodeStarted {
                node_id: node_id.into(),
                attempt,
            },
        ))
    }

    pub fn record_node_completed(
        &self,
        node_id: impl Into<String>,
        output: Value,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::Running {
            return Err(invalid_state(self.status, "record_node_completed"));
        }
        let next = self.transition(now);
        Ok((
            next,
            RunEvent::NodeCompleted {
                node_id: node_id.into(),
                output,
                duration_ms,
            },
        ))
    }

    fn fail_recursion(&self, now: DateTime<Utc>) -> Result<(Run, RunEvent), RunError> {
        self.fail(
            RunErrorInfo {
                code: "max_iterations_exceeded".to_string(),
                message: format!(
                    "recursion limit exceeded after {} steps (limit {})",
                    self.nodes_executed, self.config.recursion_limit
                ),
                node: None,
            },
            now,
        )
    }

    /// `RequiresAction(interrupt_id, reason, tool_calls)`. `tool_calls` is
    /// carried on the `Interrupt` record itself (see `domain::interrupt`),
    /// not duplicated on the run.
    pub fn requires_action(
        &self,
        interrupt_id: InterruptId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::Running {
            return Err(invalid_state(self.status, "requires_action"));
        }
        let reason = reason.into();
        let mut next = self.transition(now);
        next.status = RunStatus::RequiresAction;
        next.required_action = Some(RequiredAction {
            interrupt_id,
            reason: reason.clone(),
        });
        Ok((
            next,
            RunEvent::RequiresAction {
                interrupt_id,
                reason,
            },
        ))
    }

    /// `ResumeWithToolOutputs(outputs)` — the run-level half of resume; the
    /// interrupt/checkpoint merge itself lives in `engine::interrupt`.
    pub fn resume(&self, now: DateTime<Utc>) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::RequiresAction {
            return Err(invalid_state(self.status, "resume"));
        }
        let mut next = self.transition(now);
        next.status = RunStatus::Running;
        next.required_action = None;
        Ok((next, RunEvent::RunResumed))
    }

    pub fn complete(&self, output: Value, now: DateTime<Utc>) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::Running {
            return Err(invalid_state(self.status, "complete"));
        }
        let mut next = self.transition(now);
        next.status = RunStatus::Success;
        next.output = Some(output.clone());
        next.completed_at = Some(now);
        Ok((next, RunEvent::Completed { output }))
    }

    pub fn fail(
        &self,
        error: RunErrorInfo,
        now: DateTime<Utc>,
    ) -> Result<(Run, RunEvent), RunError> {
        if self.status.is_terminal() {
            return Err(invalid_state(self.status, "fail"));
        }
        let mut next = self.transition(now);
        next.status = RunStatus::Error;
        next.error = Some(error.clone());
        next.completed_at = Some(now);
        Ok((next, RunEvent::Failed { error }))
    }

    pub fn cancel(
        &self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Run, RunEvent), RunError> {
        if !matches!(
            self.status,
            RunStatus::Pending | RunStatus::Running | RunStatus::RequiresAction
        ) {
            return Err(invalid_state(self.status, "cancel"));
        }
        let mut next = self.transition(now);
        next.status = RunStatus::Cancelled;
        next.completed_at = Some(now);
        Ok((next, RunEvent::Cancelled { reason: reason.clone() }))
    }

    pub fn timeout(&self, now: DateTime<Utc>) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::Running {
            return Err(invalid_state(self.status, "timeout"));
        }
        let mut next = self.transition(now);
        next.status = RunStatus::Timeout;
        next.completed_at = Some(now);
        Ok((next, RunEvent::TimedOut))
    }

    /// A cancel request raced the executor: the engine yielded before the
    /// in-flight node honoured cancellation, so the run lands in
    /// `interrupted` rather than `cancelled`.
    pub fn interrupt(
        &self,
        node_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(Run, RunEvent), RunError> {
        if self.status != RunStatus::Running {
            return Err(invalid_state(self.status, "interrupt"));
        }
        let mut next = self.transition(now);
        next.status = RunStatus::Interrupted;
        next.completed_at = Some(now);
        Ok((next, RunEvent::Interrupted {
            node_id: node_id.into(),
        }))
    }
}

fn invalid_state(status: RunStatus, op: &'static str) -> RunError {
    RunError::InvalidState(format!("cannot apply `{op}` to run in status {status:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn create_starts_pending_at_version_one() {
        let (run, event) = Run::create(
            ThreadId::new(),
            AssistantId::new(),
            serde_json::json!({"q": "hi"}),
            RunConfig::default(),
            MultitaskStrategy::Reject,
            now(),
        );
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.version, 1);
        assert!(matches!(event, RunEvent::Created { .. }));
    }

    #[test]
    fn start_without_graph_fails_run_instead_of_leaving_pending() {
        let (run, _) = Run::create(
            ThreadId::new(),
            AssistantId::new(),
            serde_json::json!({}),
            RunConfig::default(),
            MultitaskStrategy::Reject,
            now(),
        );
        let (run, event) = run.start(None, now()).unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert!(matches!(event, RunEvent::Failed { .. }));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let (run, _) = Run::create(
            ThreadId::new(),
            AssistantId::new(),
            serde_json::json!({}),
            RunConfig::default(),
            MultitaskStrategy::Reject,
            now(),
        );
        let (run, _) = run.start(Some(GraphId::new()), now()).unwrap();
        let (run, _) = run.complete(serde_json::json!({"ok": true}), now()).unwrap();
        assert!(run.status.is_terminal());
        assert!(run.cancel(None, now()).is_err());
    }

    #[test]
    fn interrupt_lands_the_run_in_interrupted_not_cancelled() {
        let (run, _) = Run::create(
            ThreadId::new(),
            AssistantId::new(),
            serde_json::json!({}),
            RunConfig::default(),
            MultitaskStrategy::Reject,
            now(),
        );
        let (run, _) = run.start(Some(GraphId::new()), now()).unwrap();
        let (run, event) = run.interrupt("n1", now()).unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
        assert!(run.status.is_terminal());
        assert!(matches!(event, RunEvent::Interrupted { node_id } if node_id == "n1"));
        assert!(run.cancel(None, now()).is_err());
    }

    #[test]
    fn recursion_limit_fails_the_run() {
        let (run, _) = Run::create(
            ThreadId::new(),
            AssistantId::new(),
            serde_json::json!({}),
            RunConfig {
                recursion_limit: 1,
                ..Default::default()
            },
            MultitaskStrategy::Reject,
            now(),
        );
        let (run, _) = run.start(Some(GraphId::new()), now()).unwrap();
        let (run, _) = run.record_node_started("n1", 1, now()).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        let (run, event) = run.record_node_started("n2", 1, now()).unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert!(matches!(event, RunEvent::Failed { .. }));
    }
}
