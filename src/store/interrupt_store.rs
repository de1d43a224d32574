//! Pending human-in-loop requests: create on `RequiresAction`, resolve on
//! `ResumeWithToolOutputs`.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::interrupt::Interrupt;
use crate::errors::RunError;
use crate::ids::{InterruptId, RunId};

#[async_trait]
pub trait InterruptStore: Send + Sync {
    async fn create(&self, interrupt: Interrupt) -> Result<(), RunError>;

    /// Unresolved interrupts for a run. Resume rejects with `InvalidState`
    /// if this comes back empty.
    async fn unresolved_for_run(&self, run_id: RunId) -> Result<Vec<Interrupt>, RunError>;

    async fn get(&self, id: InterruptId) -> Result<Option<Interrupt>, RunError>;

    async fn save(&self, interrupt: Interrupt) -> Result<(), RunError>;
}

#[derive(Default)]
pub struct InMemoryInterruptStore {
    rows: RwLock<Vec<Interrupt>>,
}

impl InMemoryInterruptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterruptStore for InMemoryInterruptStore {
    async fn create(&self, interrupt: Interrupt) -> Result<(), RunError> {
        self.rows
            .write()
            .map_err(|e| RunError::internal(format!("interrupt store lock poisoned: {e}")))?
            .push(interrupt);
        Ok(())
    }

    async fn unresolved_for_run(&self, run_id: RunId) -> Result<Vec<Interrupt>, RunError> {
        let rows = self
            .rows
            .read()
            .map_err(|e| RunError::internal(format!("interrupt store lock poisoned: {e}")))?;
        Ok(rows
            .iter()
            .filter(|i| i.run_id == run_id && !i.resolved)
            .cloned()
            .collect())
    }

    async fn get(&self, id: InterruptId) -> Result<Option<Interrupt>, RunError> {
        let rows = self
            .rows
            .read()
            .map_err(|e| RunError::internal(format!("interrupt store lock poisoned: {e}")))?;
        Ok(rows.iter().find(|i| i.id == id).cloned())
    }

    async fn save(&self, interrupt: Interrupt) -> Result<(), RunError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| RunError::internal(format!("interrupt store lock poisoned: {e}")))?;
        if let Some(slot) = rows.iter_mut().find(|i| i.id == interrupt.id) {
            *slot = interrupt;
        } else {
            rows.push(interrupt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interrupt::InterruptReason;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn unresolved_for_run_excludes_resolved_interrupts() {
        let store = InMemoryInterruptStore::new();
        let run_id = RunId::new();
        let pending = Interrupt::new(run_id, "n1", InterruptReason::ToolCall, json!({}), vec![], Utc::now());
        let mut resolved = Interrupt::new(run_id, "n2", InterruptReason::ApprovalRequired, json!({}), vec![], Utc::now());
        resolved.resolve(Utc::now());

        store.create(pending.clone()).await.unwrap();
        store.create(resolved).await.unwrap();

        let unresolved = store.unresolved_for_run(run_id).await.unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, pending.id);
    }

    #[tokio::test]
    async fn save_updates_an_existing_row_in_place() {
        let store = InMemoryInterruptStore::new();
        let run_id = RunId::new();
        let mut interrupt = Interrupt::new(run_id, "n1", InterruptReason::InputNeeded, json!({}), vec![], Utc::now());
        store.create(interrupt.clone()).await.unwrap();

        interrupt.resolve(Utc::now());
        store.save(interrupt.clone()).await.unwrap();

        let fetched = store.get(interrupt.id).await.unwrap().unwrap();
        assert!(fetched.resolved);
        assert!(store.unresolved_for_run(run_id).await.unwrap().is_empty());
    }
}

#[cfg(feature = "postgres")]
pub use postgres_impl::PgInterruptStore;

#[cfg(feature = "postgres")]
mod postgres_impl {
    use super::*;
    use crate::domain::interrupt::InterruptReason;
    use crate::errors::InternalError;
    use sqlx::{PgPool, Row};

    pub struct PgInterruptStore {
        pool: PgPool,
    }

    impl PgInterruptStore {
        #[must_use]
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        fn row_to_interrupt(row: &sqlx::postgres::PgRow) -> Result<Interrupt, sqlx::Error> {
            let reason: String = row.try_get("reason")?;
            let reason = match reason.as_str() {
                "approval_required" => InterruptReason::ApprovalRequired,
                "input_needed" => InterruptReason::InputNeeded,
                _ => InterruptReason::ToolCall,
            };
            let tool_calls: serde_json::Value = row.try_get("tool_calls")?;
            Ok(Interrupt {
                id: crate::ids::InterruptId::from_uuid(row.try_get("id")?),
                run_id: crate::ids::RunId::from_uuid(row.try_get("run_id")?),
                node_id: row.try_get("node_id")?,
                reason,
                state: row.try_get("state")?,
                tool_calls: tool_calls.as_array().cloned().unwrap_or_default(),
                resolved: row.try_get("resolved")?,
                resolved_at: row.try_get("resolved_at")?,
                created_at: row.try_get("created_at")?,
            })
        }
    }

    #[async_trait]
    impl InterruptStore for PgInterruptStore {
        async fn create(&self, interrupt: Interrupt) -> Result<(), RunError> {
            let reason = match interrupt.reason {
                InterruptReason::ToolCall => "tool_call",
                InterruptReason::ApprovalRequired => "approval_required",
                InterruptReason::InputNeeded => "input_needed",
            };
            sqlx::query(
                r#"
                INSERT INTO interrupts (id, run_id, node_id, reason, state, tool_calls, resolved, resolved_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(interrupt.id.as_uuid())
            .bind(interrupt.run_id.as_uuid())
            .bind(&interrupt.node_id)
            .bind(reason)
            .bind(&interrupt.state)
            .bind(serde_json::Value::Array(interrupt.tool_calls.clone()))
            .bind(interrupt.resolved)
            .bind(interrupt.resolved_at)
            .bind(interrupt.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }

        async fn unresolved_for_run(&self, run_id: RunId) -> Result<Vec<Interrupt>, RunError> {
            let rows = sqlx::query("SELECT * FROM interrupts WHERE run_id = $1 AND NOT resolved")
                .bind(run_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            rows.iter()
                .map(Self::row_to_interrupt)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn get(&self, id: InterruptId) -> Result<Option<Interrupt>, RunError> {
            let row = sqlx::query("SELECT * FROM interrupts WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            row.map(|r| Self::row_to_interrupt(&r))
                .transpose()
                .map_err(|e| RunError::Internal(InternalError::Database(e)))
        }

        async fn save(&self, interrupt: Interrupt) -> Result<(), RunError> {
            sqlx::query(
                "UPDATE interrupts SET resolved = $2, resolved_at = $3 WHERE id = $1",
            )
            .bind(interrupt.id.as_uuid())
            .bind(interrupt.resolved)
            .bind(interrupt.resolved_at)
            .execute(&self.pool)
            .await
            .map_err(|e| RunError::Internal(InternalError::Database(e)))?;
            Ok(())
        }
    }
}
