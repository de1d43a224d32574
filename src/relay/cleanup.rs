//! Independent periodic task trimming published outbox rows older than the
//! configured retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::instrument;

use crate::store::outbox::Outbox;

pub struct CleanupWorker {
    outbox: Arc<dyn Outbox>,
    interval: Duration,
    retention: Duration,
}

impl CleanupWorker {
    #[must_use]
    pub fn new(outbox: Arc<dyn Outbox>, interval: Duration, retention: Duration) -> Self {
        Self {
            outbox,
            interval,
            retention,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    #[instrument(skip(self), err(Debug))]
    async fn tick(&self) -> Result<(), crate::errors::RunError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::zero());
        let removed = self.outbox.cleanup_published_before(cutoff).await?;
        if removed > 0 {
            tracing::debug!(removed, "cleaned up published outbox rows");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::outbox::{InMemoryOutbox, OutboxEntry};
    use serde_json::json;
    use uuid::Uuid;

    fn entry_created_at(created_at: chrono::DateTime<Utc>, published: bool) -> OutboxEntry {
        OutboxEntry {
            id: crate::ids::OutboxId::new(),
            event_id: Uuid::new_v4(),
            aggregate_type: "run".to_string(),
            aggregate_id: Uuid::new_v4(),
            event_type: "run.completed".to_string(),
            payload: json!({}),
            metadata: json!({}),
            published,
            attempts: 0,
            last_error: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn tick_removes_only_old_published_rows() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let now = Utc::now();

        let stale_published = entry_created_at(now - chrono::Duration::hours(2), true);
        let fresh_published = entry_created_at(now, true);
        let stale_unpublished = entry_created_at(now - chrono::Duration::hours(2), false);

        outbox.enqueue(stale_published.clone()).await.unwrap();
        outbox.enqueue(fresh_published.clone()).await.unwrap();
        outbox.enqueue(stale_unpublished.clone()).await.unwrap();

        let worker = CleanupWorker::new(
            outbox.clone(),
            Duration::from_millis(10),
            Duration::from_secs(3600),
        );
        worker.tick().await.unwrap();

        let remaining_unpublished = outbox.poll_unpublished(10).await.unwrap();
        assert!(remaining_unpublished.iter().any(|e| e.id == stale_unpublished.id));

        let removed_again = outbox
            .cleanup_published_before(now + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed_again, 1, "only fresh_published should remain to be swept");
    }

    #[tokio::test]
    async fn run_exits_promptly_once_shutdown_signals() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let worker = CleanupWorker::new(outbox, Duration::from_secs(3600), Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cleanup task should exit after shutdown signal")
            .unwrap();
    }
}
