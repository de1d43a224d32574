//! Append-only event log, keyed by aggregate, with optimistic concurrency.
//!
//! Grounded in `runtimes::checkpointer_sqlite::SQLiteCheckpointer`'s
//! transactional-insert idiom, targeting Postgres instead of SQLite since
//! the orchestration service's durability story is Postgres-backed (see
//! `config::AppConfig::database_url`).

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::event::DomainEvent;
use crate::errors::{InternalError, RunError};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event. Fails with `ConcurrencyConflict` if
    /// `(aggregate_type, aggregate_id, aggregate_version)` already exists —
    /// the unique index `events` carries is the actual enforcement point in
    /// the Postgres backend; the in-memory backend checks explicitly.
    async fn append(&self, event: DomainEvent) -> Result<(), RunError>;

    /// Full ordered history for one aggregate, for replay/audit.
    async fn load_stream(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<DomainEvent>, RunError>;
}

/// Process-local event store for tests and the in-memory deployment mode.
/// An instance with an explicit lifetime, not a singleton.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<FxHashMap<(String, Uuid), Vec<DomainEvent>>>,
}

impl InMemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: DomainEvent) -> Result<(), RunError> {
        let key = (event.aggregate_type.clone(), event.aggregate_id);
        let mut streams = self
            .streams
            .write()
            .map_err(|e| RunError::internal(format!("event store lock poisoned: {e}")))?;
        let stream = streams.entry(key).or_default();
        if stream
            .iter()
            .any(|e| e.aggregate_version == event.aggregate_version)
        {
            return Err(RunError::ConcurrencyConflict {
                aggregate: "event",
                id: event.aggregate_id.to_string(),
                expected: event.aggregate_version as i64,
                actual: stream.len() as i64,
            });
        }
        stream.push(event);
        Ok(())
    }

    async fn load_stream(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<DomainEvent>, RunError> {
        let streams = self
            .streams
            .read()
            .map_err(|e| RunError::internal(format!("event store lock poisoned: {e}")))?;
        Ok(streams
            .get(&(aggregate_type.to_string(), aggregate_id))
            .cloned()
            .unwrap_or_default())
    }
}


#[cfg(feature = "postgres")]
pub use postgres_impl::PgEventStore;

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use sqlx::{PgPool, Row};

    pub struct PgEventStore {
        pool: PgPool,
    }

    impl PgEventStore {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Append within an already-open transaction, so callers can commit
        /// the event alongside the aggregate row and outbox insert — the
        /// same one-transaction discipline `store::repository` relies on.
        pub async fn append_in_tx(
            tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
            event: &DomainEvent,
        ) -> Result<(), RunError> {
            sqlx::query(
                r#"
                INSERT INTO events (id, aggregate_type, aggregate_id, aggregate_version, event_type, payload, occurred_at, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.aggregate_id)
            .bind(event.aggregate_version as i64)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.occurred_at)
            .bind(&event.metadata)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_conflict(e, event))?;
            Ok(())
        }
    }

    fn map_conflict(err: sqlx::Error, event: &DomainEvent) -> RunError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RunError::ConcurrencyConflict {
                    aggregate: "event",
                    id: event.aggregate_id.to_string(),
                    expected: event.aggregate_version as i64,
                    actual: event.aggregate_version as i64 - 1,
                };
            }
        }
        RunError::Internal(InternalError::Database(err))
    }

    #[async_trait]
    impl EventStore for PgEventStore {
        async fn append(&self, event: DomainEvent) -> Result<(), RunError> {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Self::append_in_tx(&mut tx, &event).await?;
            tx.commit()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }

        async fn load_stream(
            &self,
            aggregate_type: &str,
            aggregate_id: Uuid,
        ) -> Result<Vec<DomainEvent>, RunError> {
            let rows = sqlx::query(
                r#"
                SELECT id, aggregate_type, aggregate_id, aggregate_version, event_type, payload, occurred_at, metadata
                FROM events
                WHERE aggregate_type = $1 AND aggregate_id = $2
                ORDER BY aggregate_version ASC
                "#,
            )
            .bind(aggregate_type)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;

            rows.into_iter()
                .map(|row| {
                    Ok(DomainEvent {
                        event_id: crate::ids::EventId::from_uuid(row.try_get("id")?),
                        aggregate_type: row.try_get("aggregate_type")?,
                        aggregate_id: row.try_get("aggregate_id")?,
                        aggregate_version: row.try_get::<i64, _>("aggregate_version")? as u64,
                        event_type: row.try_get("event_type")?,
                        payload: row.try_get("payload")?,
                        occurred_at: row.try_get("occurred_at")?,
                        metadata: row.try_get("metadata")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }
    }
}
