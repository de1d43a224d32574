//! `service::facade::RunService::resume_run` end to end: an interrupt
//! resolves exactly once, forks a checkpoint off the merged tool outputs,
//! and resumes the run — a second resume on the same interrupt is rejected
//! rather than silently re-applying the outputs.

use std::sync::Arc;

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::json;
use weavegraph::domain::interrupt::{Interrupt, InterruptReason};
use weavegraph::domain::run::{MultitaskStrategy, RunConfig, RunStatus};
use weavegraph::errors::RunError;
use weavegraph::ids::{AssistantId, GraphId, InterruptId, ThreadId};
use weavegraph::service::commands::{CreateRunCommand, ResumeRunCommand};
use weavegraph::service::facade::RunService;
use weavegraph::store::event_store::InMemoryEventStore;
use weavegraph::store::interrupt_store::InterruptStore;
use weavegraph::store::outbox::InMemoryOutbox;
use weavegraph::store::repository::{InMemoryRunRepository, RunRepository};
use weavegraph::store::thread_store::InMemoryThreadStore;
use weavegraph::store::{InMemoryCheckpointStore, InMemoryInterruptStore};

/// Holds its own handles onto the repository/interrupt store alongside the
/// `RunService` built from clones of them, since the facade keeps those
/// fields private — an integration test has to seed state (a paused run, a
/// pending interrupt) the same way the facade's own `save`/`create` calls
/// would, without an HTTP layer in front to drive it through `create_run`.
struct Fixture {
    runs: Arc<dyn RunRepository>,
    interrupts: Arc<dyn InterruptStore>,
    service: RunService,
}

impl Fixture {
    fn new() -> Self {
        let events = Arc::new(InMemoryEventStore::new());
        let outbox = Arc::new(InMemoryOutbox::new());
        let runs: Arc<dyn RunRepository> = Arc::new(InMemoryRunRepository::new(events, outbox));
        let interrupts: Arc<dyn InterruptStore> = Arc::new(InMemoryInterruptStore::new());
        let service = RunService::new(
            runs.clone(),
            Arc::new(InMemoryThreadStore::new()),
            Arc::new(InMemoryCheckpointStore::new()),
            interrupts.clone(),
        );
        Self {
            runs,
            interrupts,
            service,
        }
    }
}

#[tokio::test]
async fn resume_with_tool_outputs_resolves_the_interrupt_and_forks_a_checkpoint() {
    let fixture = Fixture::new();
    let created = fixture
        .service
        .create_run(CreateRunCommand {
            thread_id: ThreadId::new(),
            assistant_id: AssistantId::new(),
            input: json!({}),
            config: RunConfig::default(),
            multitask_strategy: MultitaskStrategy::Reject,
        })
        .await
        .unwrap();

    let (started, _) = created.start(Some(GraphId::new()), Utc::now()).unwrap();
    let (paused, requires_action_event) = started
        .requires_action(InterruptId::new(), "tool_call", Utc::now())
        .unwrap();
    fixture
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
    fixture
        .interrupts
        .create(interrupt)
        .await
        .unwrap();

    let mut outputs = FxHashMap::default();
    outputs.insert("call_1_result".to_string(), json!("42"));
    let resumed = fixture
        .service
        .resume_run(ResumeRunCommand {
            run_id: paused.id,
            tool_outputs: outputs,
        })
        .await
        .unwrap();

    assert_eq!(resumed.status, RunStatus::Running);
    let history = fixture
        .service
        .checkpoint_history(paused.thread_id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].channel_values["existing"], json!(1));
    assert_eq!(history[0].channel_values["call_1_result"], json!("42"));
}

#[tokio::test]
async fn resuming_the_same_interrupt_twice_rejects_the_second_call() {
    let fixture = Fixture::new();
    let created = fixture
        .service
        .create_run(CreateRunCommand {
            thread_id: ThreadId::new(),
            assistant_id: AssistantId::new(),
            input: json!({}),
            config: RunConfig::default(),
            multitask_strategy: MultitaskStrategy::Reject,
        })
        .await
        .unwrap();

    let (started, _) = created.start(Some(GraphId::new()), Utc::now()).unwrap();
    let (paused, requires_action_event) = started
        .requires_action(InterruptId::new(), "tool_call", Utc::now())
        .unwrap();
    fixture
        .runs
        .save(paused.clone(), requires_action_event)
        .await
        .unwrap();
    fixture
        .interrupts
        .create(Interrupt::new(
            paused.id,
            "tool_node",
            InterruptReason::ToolCall,
            json!({}),
            vec![],
            Utc::now(),
        ))
        .await
        .unwrap();

    fixture
        .service
        .resume_run(ResumeRunCommand {
            run_id: paused.id,
            tool_outputs: FxHashMap::default(),
        })
        .await
        .unwrap();

    let second = fixture
        .service
        .resume_run(ResumeRunCommand {
            run_id: paused.id,
            tool_outputs: FxHashMap::default(),
        })
        .await;
    assert!(matches!(second, Err(RunError::InvalidState(_))));
}

#[tokio::test]
async fn resuming_a_run_with_no_unresolved_interrupt_fails() {
    let fixture = Fixture::new();
    let created = fixture
        .service
        .create_run(CreateRunCommand {
            thread_id: ThreadId::new(),
            assistant_id: AssistantId::new(),
            input: json!({}),
            config: RunConfig::default(),
            multitask_strategy: MultitaskStrategy::Reject,
        })
        .await
        .unwrap();

    let result = fixture
        .service
        .resume_run(ResumeRunCommand {
            run_id: created.id,
            tool_outputs: FxHashMap::default(),
        })
        .await;
    assert!(matches!(result, Err(RunError::InvalidState(_))));
}
