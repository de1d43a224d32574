//! Thread aggregate persistence: conversation container, "live"
//! channel-values, and the at-most-one-in-flight-run invariant the
//! repository layer enforces via a conditional insert on `runs`.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::thread::Thread;
use crate::errors::RunError;
use crate::ids::ThreadId;

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn get(&self, id: ThreadId) -> Result<Option<Thread>, RunError>;

    async fn save(&self, thread: Thread) -> Result<(), RunError>;
}

#[derive(Default)]
pub struct InMemoryThreadStore {
    rows: RwLock<rustc_hash::FxHashMap<ThreadId, Thread>>,
}

impl InMemoryThreadStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn get(&self, id: ThreadId) -> Result<Option<Thread>, RunError> {
        let rows = self
            .rows
            .read()
            .map_err(|e| RunError::internal(format!("thread store lock poisoned: {e}")))?;
        Ok(rows.get(&id).cloned())
    }

    async fn save(&self, thread: Thread) -> Result<(), RunError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| RunError::internal(format!("thread store lock poisoned: {e}")))?;
        rows.insert(thread.id, thread);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn get_on_unknown_thread_returns_none() {
        let store = InMemoryThreadStore::new();
        assert!(store.get(ThreadId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = InMemoryThreadStore::new();
        let thread = Thread::new(Utc::now());
        let id = thread.id;
        store.save(thread).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }
}

#[cfg(feature = "postgres")]
pub use postgres_impl::PgThreadStore;

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use crate::domain::thread::ThreadStatus;
    use crate::errors::InternalError;
    use rustc_hash::FxHashMap;
    use sqlx::{PgPool, Row};

    pub struct PgThreadStore {
        pool: PgPool,
    }

    impl PgThreadStore {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        fn row_to_thread(row: &sqlx::postgres::PgRow) -> Result<Thread, sqlx::Error> {
            let status: String = row.try_get("status")?;
            let status = match status.as_str() {
                "busy" => ThreadStatus::Busy,
                "interrupted" => ThreadStatus::Interrupted,
                "error" => ThreadStatus::Error,
                _ => ThreadStatus::Idle,
            };
            let values: serde_json::Value = row.try_get("values")?;
            let metadata: serde_json::Value = row.try_get("metadata")?;
            Ok(Thread {
                id: crate::ids::ThreadId::from_uuid(row.try_get("id")?),
                status,
                values: serde_json::from_value::<FxHashMap<String, serde_json::Value>>(values)
                    .unwrap_or_default(),
                messages: Vec::new(),
                metadata: serde_json::from_value::<FxHashMap<String, serde_json::Value>>(metadata)
                    .unwrap_or_default(),
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    }

    #[async_trait]
    impl ThreadStore for PgThreadStore {
        async fn get(&self, id: ThreadId) -> Result<Option<Thread>, RunError> {
            let row = sqlx::query("SELECT * FROM threads WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            row.map(|r| Self::row_to_thread(&r))
                .transpose()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn save(&self, thread: Thread) -> Result<(), RunError> {
            let status = match thread.status {
                ThreadStatus::Idle => "idle",
                ThreadStatus::Busy => "busy",
                ThreadStatus::Interrupted => "interrupted",
                ThreadStatus::Error => "error",
            };
            let values = serde_json::to_value(&thread.values)
                .map_err(|e| RunError::internal(format!("failed to serialize thread values: {e}")))?;
            let metadata = serde_json::to_value(&thread.metadata).map_err(|e| {
                RunError::internal(format!("failed to serialize thread metadata: {e}"))
            })?;
            sqlx::query(
                r#"
                INSERT INTO threads (id, status, values, metadata, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    status = EXCLUDED.status,
                    values = EXCLUDED.values,
                    metadata = EXCLUDED.metadata,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(thread.id.as_uuid())
            .bind(status)
            .bind(&values)
            .bind(&metadata)
            .bind(thread.created_at)
            .bind(thread.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }
    }
}
