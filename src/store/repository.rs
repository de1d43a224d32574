//! Ties `domain::run::Run`'s transition methods to durable storage: every
//! save writes the updated aggregate row, its `DomainEvent`, and an outbox
//! entry in one transaction, mirroring the `PgEventStore`/`PgOutbox`
//! `*_in_tx` pairing these stores were built around.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

use crate::domain::event::DomainEvent;
use crate::domain::run::{Run, RunEvent, RunStatus};
use crate::errors::RunError;
use crate::ids::{RunId, ThreadId};
use crate::store::event_store::EventStore;
use crate::store::outbox::{Outbox, OutboxEntry};

fn run_event_type(event: &RunEvent) -> &'static str {
    match event {
        RunEvent::Created { .. } => "run.created",
        RunEvent::Started { .. } => "run.started",
        RunEvent::NodeStarted { .. } => "run.node_started",
        RunEvent::NodeCompleted { .. } => "run.node_completed",
        RunEvent::NodeSkipped { .. } => "run.node_skipped",
        RunEvent::NodeFailed { .. } => "run.node_failed",
        RunEvent::RequiresAction { .. } => "run.requires_action",
        RunEvent::RunResumed => "run.resumed",
        RunEvent::Completed { .. } => "run.completed",
        RunEvent::Failed { .. } => "run.failed",
        RunEvent::Cancelled { .. } => "run.cancelled",
        RunEvent::TimedOut => "run.timed_out",
        RunEvent::Interrupted { .. } => "run.interrupted",
    }
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::RequiresAction => "requires_action",
        RunStatus::Success => "success",
        RunStatus::Error => "error",
        RunStatus::Cancelled => "cancelled",
        RunStatus::Timeout => "timeout",
        RunStatus::Interrupted => "interrupted",
    }
}

fn run_to_domain_event(run: &Run, event: &RunEvent) -> Result<DomainEvent, RunError> {
    let payload = serde_json::to_value(event)
        .map_err(|e| RunError::internal(format!("failed to serialize run event: {e}")))?;
    Ok(DomainEvent::new(
        "run",
        run.id.as_uuid(),
        run.version as u64,
        run_event_type(event),
        payload,
        run.updated_at,
    ))
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn get(&self, id: RunId) -> Result<Option<Run>, RunError>;

    /// Any run on `thread_id` not yet in a terminal state, for the
    /// multitask-strategy check `Run::create`'s caller performs.
    async fn active_for_thread(&self, thread_id: ThreadId) -> Result<Vec<Run>, RunError>;

    /// Persist `run` as it stands after applying `event`, plus the event
    /// itself and its outbox row, as a single durable unit.
    async fn save(&self, run: Run, event: RunEvent) -> Result<(), RunError>;
}

pub struct InMemoryRunRepository {
    runs: RwLock<FxHashMap<RunId, Run>>,
    events: Arc<dyn EventStore>,
    outbox: Arc<dyn Outbox>,
}

impl InMemoryRunRepository {
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, outbox: Arc<dyn Outbox>) -> Self {
        Self {
            runs: RwLock::new(FxHashMap::default()),
            events,
            outbox,
        }
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn get(&self, id: RunId) -> Result<Option<Run>, RunError> {
        let runs = self
            .runs
            .read()
            .map_err(|e| RunError::internal(format!("run repository lock poisoned: {e}")))?;
        Ok(runs.get(&id).cloned())
    }

    async fn active_for_thread(&self, thread_id: ThreadId) -> Result<Vec<Run>, RunError> {
        let runs = self
            .runs
            .read()
            .map_err(|e| RunError::internal(format!("run repository lock poisoned: {e}")))?;
        Ok(runs
            .values()
            .filter(|r| r.thread_id == thread_id && !r.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn save(&self, run: Run, event: RunEvent) -> Result<(), RunError> {
        let domain_event = run_to_domain_event(&run, &event)?;
        // The event append is where the optimistic-concurrency check lives;
        // it must happen before the denormalized row is written so a
        // rejected append never leaves `self.runs` holding the losing state.
        self.events.append(domain_event.clone()).await?;
        self.outbox
            .enqueue(OutboxEntry::from_event(&domain_event))
            .await?;
        {
            let mut runs = self
                .runs
                .write()
                .map_err(|e| RunError::internal(format!("run repository lock poisoned: {e}")))?;
            runs.insert(run.id, run);
        }
        Ok(())
    }
}


#[cfg(feature = "postgres")]
pub use postgres_impl::PgRunRepository;

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use crate::domain::run::{MultitaskStrategy, RequiredAction, RunConfig, RunErrorInfo};
    use crate::errors::InternalError;
    use crate::ids::{AssistantId, GraphId};
    use crate::store::event_store::PgEventStore;
    use crate::store::outbox::PgOutbox;
    use sqlx::{PgPool, Row};

    pub struct PgRunRepository {
        pool: PgPool,
    }

    impl PgRunRepository {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        fn row_to_run(row: &sqlx::postgres::PgRow) -> Result<Run, sqlx::Error> {
            let status: String = row.try_get("status")?;
            let status = match status.as_str() {
                "running" => RunStatus::Running,
                "requires_action" => RunStatus::RequiresAction,
                "success" => RunStatus::Success,
                "error" => RunStatus::Error,
                "cancelled" => RunStatus::Cancelled,
                "timeout" => RunStatus::Timeout,
                "interrupted" => RunStatus::Interrupted,
                _ => RunStatus::Pending,
            };
            let multitask_strategy: String = row.try_get("multitask_strategy")?;
            let multitask_strategy = match multitask_strategy.as_str() {
                "interrupt" => MultitaskStrategy::Interrupt,
                "rollback" => MultitaskStrategy::Rollback,
                "enqueue" => MultitaskStrategy::Enqueue,
                _ => MultitaskStrategy::Reject,
            };
            let error: Option<serde_json::Value> = row.try_get("error")?;
            let required_action: Option<serde_json::Value> = row.try_get("required_action")?;
            let config: serde_json::Value = row.try_get("config")?;
            Ok(Run {
                id: RunId::from_uuid(row.try_get("id")?),
                thread_id: ThreadId::from_uuid(row.try_get("thread_id")?),
                assistant_id: AssistantId::from_uuid(row.try_get("assistant_id")?),
                graph_id: row
                    .try_get::<Option<uuid::Uuid>, _>("graph_id")?
                    .map(GraphId::from_uuid),
                status,
                input: row.try_get("input")?,
                output: row.try_get("output")?,
                error: error
                    .map(serde_json::from_value::<RunErrorInfo>)
                    .transpose()
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                required_action: required_action
                    .map(serde_json::from_value::<RequiredAction>)
                    .transpose()
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                multitask_strategy,
                config: serde_json::from_value::<RunConfig>(config)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                nodes_executed: row.try_get::<i64, _>("nodes_executed")? as u64,
                version: row.try_get("version")?,
                created_at: row.try_get("created_at")?,
                started_at: row.try_get("started_at")?,
                completed_at: row.try_get("completed_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    }

    #[async_trait]
    impl RunRepository for PgRunRepository {
        async fn get(&self, id: RunId) -> Result<Option<Run>, RunError> {
            let row = sqlx::query("SELECT * FROM runs WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            row.map(|r| Self::row_to_run(&r))
                .transpose()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn active_for_thread(&self, thread_id: ThreadId) -> Result<Vec<Run>, RunError> {
            let rows = sqlx::query(
                r#"
                SELECT * FROM runs
                WHERE thread_id = $1
                  AND status NOT IN ('success', 'error', 'cancelled', 'timeout')
                "#,
            )
            .bind(thread_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            rows.iter()
                .map(Self::row_to_run)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn save(&self, run: Run, event: RunEvent) -> Result<(), RunError> {
            let domain_event = run_to_domain_event(&run, &event)?;
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;

            let config = serde_json::to_value(&run.config)
                .map_err(|e| RunError::internal(format!("failed to serialize run config: {e}")))?;
            let error = run
                .error
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| RunError::internal(format!("failed to serialize run error: {e}")))?;
            let required_action = run
                .required_action
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| {
                    RunError::internal(format!("failed to serialize required action: {e}"))
                })?;
            let multitask_strategy = match run.multitask_strategy {
                MultitaskStrategy::Reject => "reject",
                MultitaskStrategy::Interrupt => "interrupt",
                MultitaskStrategy::Rollback => "rollback",
                MultitaskStrategy::Enqueue => "enqueue",
            };

            sqlx::query(
                r#"
                INSERT INTO runs (
                    id, thread_id, assistant_id, status, input, output, error,
                    required_action, config, multitask_strategy, nodes_executed,
                    version, created_at, started_at, completed_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (id) DO UPDATE SET
                    status = EXCLUDED.status,
                    output = EXCLUDED.output,
                    error = EXCLUDED.error,
                    required_action = EXCLUDED.required_action,
                    nodes_executed = EXCLUDED.nodes_executed,
                    version = EXCLUDED.version,
                    started_at = EXCLUDED.started_at,
                    completed_at = EXCLUDED.completed_at,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(run.id.as_uuid())
            .bind(run.thread_id.as_uuid())
            .bind(run.assistant_id.as_uuid())
            .bind(run_status_str(run.status))
            .bind(&run.input)
            .bind(&run.output)
            .bind(&error)
            .bind(&required_action)
            .bind(&config)
            .bind(multitask_strategy)
            .bind(run.nodes_executed as i64)
            .bind(run.version)
            .bind(run.created_at)
            .bind(run.started_at)
            .bind(run.completed_at)
            .bind(run.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;

            PgEventStore::append_in_tx(&mut tx, &domain_event).await?;
            PgOutbox::enqueue_in_tx(&mut tx, &OutboxEntry::from_event(&domain_event)).await?;

            tx.commit()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }
    }
}
