//! Per-thread checkpoint history: `GetLatest`, `GetById`, `History`, `Put`,
//! `Fork`. Writes of a checkpoint and its per-channel writes are
//! transactional together, the same discipline the event/outbox pair keeps.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::RwLock;

use crate::domain::checkpoint::{Checkpoint, CheckpointWrite};
use crate::errors::RunError;
use crate::ids::{CheckpointId, ThreadId};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_latest(
        &self,
        thread_id: ThreadId,
        namespace: &str,
    ) -> Result<Option<Checkpoint>, RunError>;

    async fn get_by_id(
        &self,
        thread_id: ThreadId,
        namespace: &str,
        id: CheckpointId,
    ) -> Result<Option<Checkpoint>, RunError>;

    /// Most-recent-first, capped at `limit`.
    async fn history(&self, thread_id: ThreadId, limit: usize) -> Result<Vec<Checkpoint>, RunError>;

    async fn put(&self, checkpoint: Checkpoint, writes: Vec<CheckpointWrite>) -> Result<(), RunError>;

    /// Copy the chain up to `from_checkpoint_id` under a freshly minted
    /// thread id and reparent it there, backing the "copy thread" operation.
    /// Returns the new thread id.
    async fn fork(
        &self,
        thread_id: ThreadId,
        from_checkpoint_id: CheckpointId,
    ) -> Result<ThreadId, RunError>;
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<FxHashMap<ThreadId, Vec<Checkpoint>>>,
    writes: RwLock<FxHashMap<CheckpointId, Vec<CheckpointWrite>>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get_latest(
        &self,
        thread_id: ThreadId,
        namespace: &str,
    ) -> Result<Option<Checkpoint>, RunError> {
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|e| RunError::internal(format!("checkpoint store lock poisoned: {e}")))?;
        Ok(checkpoints
            .get(&thread_id)
            .and_then(|chain| chain.iter().filter(|c| c.namespace == namespace).next_back())
            .cloned())
    }

    async fn get_by_id(
        &self,
        thread_id: ThreadId,
        namespace: &str,
        id: CheckpointId,
    ) -> Result<Option<Checkpoint>, RunError> {
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|e| RunError::internal(format!("checkpoint store lock poisoned: {e}")))?;
        Ok(checkpoints
            .get(&thread_id)
            .and_then(|chain| {
                chain
                    .iter()
                    .find(|c| c.namespace == namespace && c.id == id)
            })
            .cloned())
    }

    async fn history(&self, thread_id: ThreadId, limit: usize) -> Result<Vec<Checkpoint>, RunError> {
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|e| RunError::internal(format!("checkpoint store lock poisoned: {e}")))?;
        let mut chain = checkpoints.get(&thread_id).cloned().unwrap_or_default();
        chain.reverse();
        chain.truncate(limit);
        Ok(chain)
    }

    async fn put(&self, checkpoint: Checkpoint, writes: Vec<CheckpointWrite>) -> Result<(), RunError> {
        let mut checkpoints = self
            .checkpoints
            .write()
            .map_err(|e| RunError::internal(format!("checkpoint store lock poisoned: {e}")))?;
        checkpoints
            .entry(checkpoint.thread_id)
            .or_default()
            .push(checkpoint.clone());
        drop(checkpoints);
        self.writes
            .write()
            .map_err(|e| RunError::internal(format!("checkpoint store lock poisoned: {e}")))?
            .insert(checkpoint.id, writes);
        Ok(())
    }

    async fn fork(
        &self,
        thread_id: ThreadId,
        from_checkpoint_id: CheckpointId,
    ) -> Result<ThreadId, RunError> {
        let mut checkpoints = self
            .checkpoints
            .write()
            .map_err(|e| RunError::internal(format!("checkpoint store lock poisoned: {e}")))?;
        let chain = checkpoints
            .get(&thread_id)
            .ok_or_else(|| RunError::not_found("thread", thread_id.to_string()))?;
        let cut = chain
            .iter()
            .position(|c| c.id == from_checkpoint_id)
            .ok_or_else(|| RunError::not_found("checkpoint", from_checkpoint_id.to_string()))?;
        let new_thread_id = ThreadId::new();
        let id_map: FxHashMap<CheckpointId, CheckpointId> = chain[..=cut]
            .iter()
            .map(|c| (c.id, CheckpointId::new()))
            .collect();
        let copied: Vec<Checkpoint> = chain[..=cut]
            .iter()
            .cloned()
            .map(|mut c| {
                c.id = id_map[&c.id];
                c.thread_id = new_thread_id;
                c.parent_id = c.parent_id.and_then(|pid| id_map.get(&pid).copied());
                c
            })
            .collect();
        checkpoints.insert(new_thread_id, copied);
        Ok(new_thread_id)
    }
}


#[cfg(feature = "postgres")]
pub use postgres_impl::PgCheckpointStore;

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use crate::domain::checkpoint::WriteType;
    use crate::errors::InternalError;
    use sqlx::{PgPool, Row};

    pub struct PgCheckpointStore {
        pool: PgPool,
    }

    impl PgCheckpointStore {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        fn row_to_checkpoint(row: &sqlx::postgres::PgRow) -> Result<Checkpoint, sqlx::Error> {
            let channel_versions: serde_json::Value = row.try_get("channel_versions")?;
            let versions_seen: serde_json::Value = row.try_get("versions_seen")?;
            let pending_sends: serde_json::Value = row.try_get("pending_sends")?;
            Ok(Checkpoint {
                id: crate::ids::CheckpointId::from_uuid(row.try_get("id")?),
                thread_id: crate::ids::ThreadId::from_uuid(row.try_get("thread_id")?),
                namespace: row.try_get("ns")?,
                checkpoint_number: row.try_get::<i64, _>("checkpoint_number")? as u64,
                parent_id: row
                    .try_get::<Option<uuid::Uuid>, _>("parent_checkpoint_id")?
                    .map(crate::ids::CheckpointId::from_uuid),
                channel_values: row.try_get("channel_values")?,
                channel_versions: serde_json::from_value(channel_versions)
                    .unwrap_or_default(),
                versions_seen: serde_json::from_value(versions_seen).unwrap_or_default(),
                pending_sends: pending_sends.as_array().cloned().unwrap_or_default(),
                created_at: row.try_get("created_at")?,
            })
        }
    }

    #[async_trait]
    impl CheckpointStore for PgCheckpointStore {
        async fn get_latest(
            &self,
            thread_id: ThreadId,
            namespace: &str,
        ) -> Result<Option<Checkpoint>, RunError> {
            let row = sqlx::query(
                r#"SELECT * FROM checkpoints WHERE thread_id = $1 AND ns = $2 ORDER BY checkpoint_number DESC LIMIT 1"#,
            )
            .bind(thread_id.as_uuid())
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            row.map(|r| Self::row_to_checkpoint(&r))
                .transpose()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn get_by_id(
            &self,
            thread_id: ThreadId,
            namespace: &str,
            id: CheckpointId,
        ) -> Result<Option<Checkpoint>, RunError> {
            let row = sqlx::query(
                r#"SELECT * FROM checkpoints WHERE thread_id = $1 AND ns = $2 AND id = $3"#,
            )
            .bind(thread_id.as_uuid())
            .bind(namespace)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            row.map(|r| Self::row_to_checkpoint(&r))
                .transpose()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn history(
            &self,
            thread_id: ThreadId,
            limit: usize,
        ) -> Result<Vec<Checkpoint>, RunError> {
            let rows = sqlx::query(
                r#"SELECT * FROM checkpoints WHERE thread_id = $1 ORDER BY checkpoint_number DESC LIMIT $2"#,
            )
            .bind(thread_id.as_uuid())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            rows.iter()
                .map(Self::row_to_checkpoint)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn put(
            &self,
            checkpoint: Checkpoint,
            writes: Vec<CheckpointWrite>,
        ) -> Result<(), RunError> {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            sqlx::query(
                r#"
                INSERT INTO checkpoints (id, thread_id, ns, checkpoint_number, parent_checkpoint_id, channel_values, channel_versions, versions_seen, pending_sends, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(checkpoint.id.as_uuid())
            .bind(checkpoint.thread_id.as_uuid())
            .bind(&checkpoint.namespace)
            .bind(checkpoint.checkpoint_number as i64)
            .bind(checkpoint.parent_id.map(|id| id.as_uuid()))
            .bind(&checkpoint.channel_values)
            .bind(serde_json::to_value(&checkpoint.channel_versions).unwrap_or_default())
            .bind(serde_json::to_value(&checkpoint.versions_seen).unwrap_or_default())
            .bind(serde_json::Value::Array(checkpoint.pending_sends.clone()))
            .bind(checkpoint.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;

            for write in &writes {
                let write_type = match write.write_type {
                    WriteType::Put => "put",
                    WriteType::Append => "append",
                };
                sqlx::query(
                    r#"
                    INSERT INTO checkpoint_writes (checkpoint_id, task_id, idx, channel, write_type, blob)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(write.checkpoint_id.as_uuid())
                .bind(&write.task)
                .bind(write.index as i32)
                .bind(&write.channel)
                .bind(write_type)
                .bind(&write.value)
                .execute(&mut *tx)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            }

            tx.commit()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }

        async fn fork(
            &self,
            thread_id: ThreadId,
            from_checkpoint_id: CheckpointId,
        ) -> Result<ThreadId, RunError> {
            let chain = self.history(thread_id, i64::MAX as usize).await?;
            let cut = chain
                .iter()
                .position(|c| c.id == from_checkpoint_id)
                .ok_or_else(|| RunError::not_found("checkpoint", from_checkpoint_id.to_string()))?;
            let new_thread_id = ThreadId::new();
            // `checkpoints.id` is the primary key, so the copy can't reuse
            // the source chain's ids; mint fresh ones and remap parent
            // references onto them.
            let id_map: FxHashMap<CheckpointId, CheckpointId> = chain[cut..]
                .iter()
                .map(|c| (c.id, CheckpointId::new()))
                .collect();
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            // chain is newest-first (history() reverses); replay oldest-first
            // so parent ids stay valid as each row is inserted.
            for checkpoint in chain[cut..].iter().rev() {
                let new_id = id_map[&checkpoint.id];
                let new_parent_id = checkpoint
                    .parent_id
                    .and_then(|pid| id_map.get(&pid).copied());
                sqlx::query(
                    r#"
                    INSERT INTO checkpoints (id, thread_id, ns, checkpoint_number, parent_checkpoint_id, channel_values, channel_versions, versions_seen, pending_sends, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(new_id.as_uuid())
                .bind(new_thread_id.as_uuid())
                .bind(&checkpoint.namespace)
                .bind(checkpoint.checkpoint_number as i64)
                .bind(new_parent_id.map(|id| id.as_uuid()))
                .bind(&checkpoint.channel_values)
                .bind(serde_json::to_value(&checkpoint.channel_versions).unwrap_or_default())
                .bind(serde_json::to_value(&checkpoint.versions_seen).unwrap_or_default())
                .bind(serde_json::Value::Array(checkpoint.pending_sends.clone()))
                .bind(checkpoint.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            }
            tx.commit()
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(new_thread_id)
        }
    }
}
