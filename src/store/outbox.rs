//! Durable pending-publication staging table, written in the same
//! transaction as the event it carries so a crash between "append event" and
//! "enqueue outbox row" can never happen.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::event::DomainEvent;
use crate::errors::{InternalError, RunError};
use crate::ids::OutboxId;

#[derive(Clone, Debug)]
pub struct OutboxEntry {
    pub id: OutboxId,
    pub event_id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub metadata: Value,
    pub published: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    #[must_use]
    pub fn from_event(event: &DomainEvent) -> Self {
        Self {
            id: OutboxId::new(),
            event_id: event.event_id.as_uuid(),
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            metadata: event.metadata.clone(),
            published: false,
            attempts: 0,
            last_error: None,
            created_at: event.occurred_at,
        }
    }
}

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn enqueue(&self, entry: OutboxEntry) -> Result<(), RunError>;

    /// Oldest-first unpublished rows, for the relay to poll. `limit` mirrors
    /// `config::AppConfig::relay_batch_size`.
    async fn poll_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, RunError>;

    async fn mark_published(&self, id: OutboxId) -> Result<(), RunError>;

    /// Record a failed publish attempt; the relay retries with backoff and
    /// never blocks or fails the originating commit.
    async fn record_failure(&self, id: OutboxId, error: String) -> Result<(), RunError>;

    /// Delete published rows older than `retention` (see
    /// `config::AppConfig::outbox_retention`).
    async fn cleanup_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RunError>;
}

#[derive(Default)]
pub struct InMemoryOutbox {
    rows: RwLock<Vec<OutboxEntry>>,
}

impl InMemoryOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn enqueue(&self, entry: OutboxEntry) -> Result<(), RunError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| RunError::internal(format!("outbox lock poisoned: {e}")))?;
        rows.push(entry);
        Ok(())
    }

    async fn poll_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, RunError> {
        let rows = self
            .rows
            .read()
            .map_err(|e| RunError::internal(format!("outbox lock poisoned: {e}")))?;
        let mut pending: Vec<OutboxEntry> = rows.iter().filter(|r| !r.published).cloned().collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_published(&self, id: OutboxId) -> Result<(), RunError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| RunError::internal(format!("outbox lock poisoned: {e}")))?;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.published = true;
        }
        Ok(())
    }

    async fn record_failure(&self, id: OutboxId, error: String) -> Result<(), RunError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| RunError::internal(format!("outbox lock poisoned: {e}")))?;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.attempts += 1;
            row.last_error = Some(error);
        }
        Ok(())
    }

    async fn cleanup_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RunError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| RunError::internal(format!("outbox lock poisoned: {e}")))?;
        let before = rows.len();
        rows.retain(|r| !(r.published && r.created_at < cutoff));
        Ok((before - rows.len()) as u64)
    }
}


#[cfg(feature = "postgres")]
pub use postgres_impl::PgOutbox;

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use sqlx::{PgPool, Row};

    pub struct PgOutbox {
        pool: PgPool,
    }

    impl PgOutbox {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Enqueue within an already-open transaction, paired with
        /// `store::event_store::PgEventStore::append_in_tx`.
        pub async fn enqueue_in_tx(
            tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
            entry: &OutboxEntry,
        ) -> Result<(), RunError> {
            sqlx::query(
                r#"
                INSERT INTO outbox (id, event_id, aggregate_type, aggregate_id, event_type, payload, metadata, published, attempts, last_error, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(entry.id.as_uuid())
            .bind(entry.event_id)
            .bind(&entry.aggregate_type)
            .bind(entry.aggregate_id)
            .bind(&entry.event_type)
            .bind(&entry.payload)
            .bind(&entry.metadata)
            .bind(entry.published)
            .bind(entry.attempts as i32)
            .bind(&entry.last_error)
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }
    }

    #[async_trait]
    impl Outbox for PgOutbox {
        async fn enqueue(&self, entry: OutboxEntry) -> Result<(), RunError> {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Self::enqueue_in_tx(&mut tx, &entry).await?;
            tx.commit()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }

        async fn poll_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, RunError> {
            let rows = sqlx::query(
                r#"
                SELECT id, event_id, aggregate_type, aggregate_id, event_type, payload, metadata, published, attempts, last_error, created_at
                FROM outbox
                WHERE NOT published
                ORDER BY created_at ASC
                LIMIT $1
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;

            rows.into_iter()
                .map(|row| {
                    Ok(OutboxEntry {
                        id: crate::ids::OutboxId::from_uuid(row.try_get("id")?),
                        event_id: row.try_get("event_id")?,
                        aggregate_type: row.try_get("aggregate_type")?,
                        aggregate_id: row.try_get("aggregate_id")?,
                        event_type: row.try_get("event_type")?,
                        payload: row.try_get("payload")?,
                        metadata: row.try_get("metadata")?,
                        published: row.try_get("published")?,
                        attempts: row.try_get::<i32, _>("attempts")? as u32,
                        last_error: row.try_get("last_error")?,
                        created_at: row.try_get("created_at")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn mark_published(&self, id: crate::ids::OutboxId) -> Result<(), RunError> {
            sqlx::query("UPDATE outbox SET published = TRUE WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }

        async fn record_failure(
            &self,
            id: crate::ids::OutboxId,
            error: String,
        ) -> Result<(), RunError> {
            sqlx::query(
                "UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }

        async fn cleanup_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RunError> {
            let result = sqlx::query("DELETE FROM outbox WHERE published AND created_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(result.rows_affected())
        }
    }
}
