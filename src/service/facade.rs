//! The command/query facade an HTTP layer (out of scope here) would sit in
//! front of. Each command persists through `store::repository`'s one-shot
//! transactional discipline; queries are plain reads.

use chrono::Utc;
use std::sync::Arc;

use crate::domain::checkpoint::Checkpoint;
use crate::domain::run::{MultitaskStrategy, Run};
use crate::domain::thread::Thread;
use crate::engine::interrupt::resume_with_tool_outputs;
use crate::errors::RunError;
use crate::ids::{CheckpointId, RunId, ThreadId};
use crate::service::commands::{
    CancelRunCommand, CreateRunCommand, ForkThreadCommand, ResumeRunCommand,
};
use crate::store::checkpoint_store::CheckpointStore;
use crate::store::interrupt_store::InterruptStore;
use crate::store::repository::RunRepository;
use crate::store::thread_store::ThreadStore;

pub struct RunService {
    runs: Arc<dyn RunRepository>,
    threads: Arc<dyn ThreadStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    interrupts: Arc<dyn InterruptStore>,
}

impl RunService {
    #[must_use]
    pub fn new(
        runs: Arc<dyn RunRepository>,
        threads: Arc<dyn ThreadStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        interrupts: Arc<dyn InterruptStore>,
    ) -> Self {
        Self {
            runs,
            threads,
            checkpoints,
            interrupts,
        }
    }

    /// `Create(thread, assistant, input, config, multitask_strategy)`. The
    /// at-most-one-in-flight-run invariant is enforced here against
    /// `RunRepository::active_for_thread`; a real deployment backs this with
    /// the conditional-insert the concurrency model describes instead of a
    /// read-then-write race window.
    pub async fn create_run(&self, command: CreateRunCommand) -> Result<Run, RunError> {
        let now = Utc::now();
        let active = self.runs.active_for_thread(command.thread_id).await?;
        if !active.is_empty() && command.multitask_strategy != MultitaskStrategy::Enqueue {
            return Err(RunError::Conflict(format!(
                "thread {} already has an in-flight run under strategy {:?}",
                command.thread_id, command.multitask_strategy
            )));
        }

        let (run, event) = Run::create(
            command.thread_id,
            command.assistant_id,
            command.input,
            command.config,
            command.multitask_strategy,
            now,
        );
        self.runs.save(run.clone(), event).await?;
        Ok(run)
    }

    pub async fn get_run(&self, run_id: RunId) -> Result<Run, RunError> {
        self.runs
            .get(run_id)
            .await?
            .ok_or_else(|| RunError::not_found("run", run_id.to_string()))
    }

    pub async fn cancel_run(&self, command: CancelRunCommand) -> Result<Run, RunError> {
        let run = self.get_run(command.run_id).await?;
        let (run, event) = run.cancel(command.reason, Utc::now())?;
        self.runs.save(run.clone(), event).await?;
        Ok(run)
    }

    /// `ResumeWithToolOutputs(run_id, outputs)` end to end: looks up the
    /// unresolved interrupt, computes the resumed run and merged
    /// channel-values, then persists the interrupt, the run event, and the
    /// new checkpoint. Calling it twice on the same interrupt fails the
    /// second time with `InvalidState`, since the first call already marked
    /// it resolved.
    pub async fn resume_run(&self, command: ResumeRunCommand) -> Result<Run, RunError> {
        let run = self.get_run(command.run_id).await?;
        let mut pending = self.interrupts.unresolved_for_run(run.id).await?;
        let interrupt = pending
            .pop()
            .ok_or_else(|| RunError::InvalidState(format!("run {} has no unresolved interrupt", run.id)))?;

        let now = Utc::now();
        let outcome = resume_with_tool_outputs(&interrupt, &run, command.tool_outputs, now)?;

        self.interrupts.save(outcome.interrupt).await?;

        let latest = self
            .checkpoints
            .get_latest(run.thread_id, "")
            .await?
            .unwrap_or_else(|| {
                Checkpoint::new(
                    run.thread_id,
                    "",
                    0,
                    None,
                    outcome.channel_values.clone(),
                    Default::default(),
                    Default::default(),
                    now,
                )
            });
        let next_checkpoint = latest.fork(
            outcome.channel_values,
            latest.channel_versions.clone(),
            latest.versions_seen.clone(),
            now,
        );
        self.checkpoints.put(next_checkpoint, Vec::new()).await?;

        self.runs.save(outcome.run.clone(), outcome.run_event).await?;
        Ok(outcome.run)
    }

    pub async fn get_thread(&self, thread_id: ThreadId) -> Result<Thread, RunError> {
        self.threads
            .get(thread_id)
            .await?
            .ok_or_else(|| RunError::not_found("thread", thread_id.to_string()))
    }

    pub async fn checkpoint_history(
        &self,
        thread_id: ThreadId,
        limit: usize,
    ) -> Result<Vec<Checkpoint>, RunError> {
        self.checkpoints.history(thread_id, limit).await
    }

    pub async fn get_checkpoint(
        &self,
        thread_id: ThreadId,
        namespace: &str,
        checkpoint_id: CheckpointId,
    ) -> Result<Checkpoint, RunError> {
        self.checkpoints
            .get_by_id(thread_id, namespace, checkpoint_id)
            .await?
            .ok_or_else(|| RunError::not_found("checkpoint", checkpoint_id.to_string()))
    }

    /// "Copy thread" operation: forks the checkpoint chain up to
    /// `from_checkpoint_id` under a freshly minted thread id.
    pub async fn fork_thread(&self, command: ForkThreadCommand) -> Result<ThreadId, RunError> {
        self.checkpoints
            .fork(command.thread_id, command.from_checkpoint_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interrupt::{Interrupt, InterruptReason};
    use crate::domain::run::RunConfig;
    use crate::ids::AssistantId;
    use crate::store::event_store::InMemoryEventStore;
    use crate::store::outbox::InMemoryOutbox;
    use crate::store::repository::InMemoryRunRepository;
    use crate::store::thread_store::InMemoryThreadStore;
    use crate::store::{InMemoryCheckpointStore, InMemoryInterruptStore};
    use rustc_hash::FxHashMap;
    use serde_json::json;

    fn service() -> RunService {
        let events = Arc::new(InMemoryEventStore::new());
        let outbox = Arc::new(InMemoryOutbox::new());
        RunService::new(
            Arc::new(InMemoryRunRepository::new(events, outbox)),
            Arc::new(InMemoryThreadStore::new()),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryInterruptStore::new()),
        )
    }

    fn create_command() -> CreateRunCommand {
        CreateRunCommand {
            thread_id: ThreadId::new(),
            assistant_id: AssistantId::new(),
            input: json!({"q": "hi"}),
            config: RunConfig::default(),
            multitask_strategy: MultitaskStrategy::Reject,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_the_run() {
        let service = service();
        let command = create_command();
        let thread_id = command.thread_id;
        let created = service.create_run(command).await.unwrap();
        assert_eq!(created.thread_id, thread_id);

        let fetched = service.get_run(created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn second_create_on_same_thread_conflicts_without_enqueue_strategy() {
        let service = service();
        let mut command = create_command();
        let thread_id = command.thread_id;
        service.create_run(command).await.unwrap();

        command = create_command();
        command.thread_id = thread_id;
        let result = service.create_run(command).await;
        assert!(matches!(result, Err(RunError::Conflict(_))));
    }

    #[tokio::test]
    async fn enqueue_strategy_allows_a_second_in_flight_run() {
        let service = service();
        let mut command = create_command();
        let thread_id = command.thread_id;
        service.create_run(command).await.unwrap();

        command = create_command();
        command.thread_id = thread_id;
        command.multitask_strategy = MultitaskStrategy::Enqueue;
        assert!(service.create_run(command).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_run_transitions_to_cancelled() {
        let service = service();
        let created = service.create_run(create_command()).await.unwrap();
        let cancelled = service
            .cancel_run(CancelRunCommand {
                run_id: created.id,
                reason: Some("operator requested".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, crate::domain::run::RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn resume_run_without_unresolved_interrupt_fails() {
        let service = service();
        let created = service.create_run(create_command()).await.unwrap();
        let result = service
            .resume_run(ResumeRunCommand {
                run_id: created.id,
                tool_outputs: FxHashMap::default(),
            })
            .await;
        assert!(matches!(result, Err(RunError::InvalidState(_))));
    }

    #[tokio::test]
    async fn resume_run_resolves_interrupt_and_forks_a_checkpoint() {
        let service = service();
        let created = service.create_run(create_command()).await.unwrap();
        let (started, _) = created.start(Some(crate::ids::GraphId::new()), Utc::now()).unwrap();
        let (paused, requires_action_event) = started
            .requires_action(crate::ids::InterruptId::new(), "tool_call", Utc::now())
            .unwrap();
        service
            .runs
            .save(paused.clone(), requires_action_event)
            .await
            .unwrap();

        let interrupt = Interrupt::new(
            paused.id,
            "tool_node",
            InterruptReason::ToolCall,
            json!({"existing": 1}),
            vec![json!({"id": "call_1"})],
            Utc::now(),
        );
        service.interrupts.create(interrupt).await.unwrap();

        let mut outputs = FxHashMap::default();
        outputs.insert("call_1_result".to_string(), json!("ok"));
        let resumed = service
            .resume_run(ResumeRunCommand {
                run_id: paused.id,
                tool_outputs: outputs,
            })
            .await
            .unwrap();

        assert_eq!(resumed.status, crate::domain::run::RunStatus::Running);
        let history = service.checkpoint_history(paused.thread_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].channel_values["call_1_result"], json!("ok"));

        let again = service
            .resume_run(ResumeRunCommand {
                run_id: paused.id,
                tool_outputs: FxHashMap::default(),
            })
            .await;
        assert!(again.is_err());
    }
}
