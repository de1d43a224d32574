//! Independent periodic task draining the transactional outbox. Claims a
//! batch of unpublished rows, hands each to a `PublishSink`, and marks it
//! published or records the failure for the next tick to retry — a publish
//! failure after the originating commit is tolerated, never fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::relay::sink::PublishSink;
use crate::store::outbox::Outbox;

pub struct OutboxRelay {
    outbox: Arc<dyn Outbox>,
    sink: Arc<dyn PublishSink>,
    interval: Duration,
    batch_size: usize,
}

impl OutboxRelay {
    #[must_use]
    pub fn new(
        outbox: Arc<dyn Outbox>,
        sink: Arc<dyn PublishSink>,
        interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            outbox,
            sink,
            interval,
            batch_size,
        }
    }

    /// Run until `shutdown` reports `true`. Intended to be spawned as its
    /// own task; multiple relays may run concurrently as long as they're
    /// partitioned by `aggregate_id` upstream, since strict per-aggregate
    /// ordering otherwise requires a single relay.
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
        let entries = self.outbox.poll_unpublished(self.batch_size).await?;
        for entry in entries {
            match self.sink.publish(&entry).await {
                Ok(()) => {
                    self.outbox.mark_published(entry.id).await?;
                }
                Err(err) => {
                    warn!(outbox_id = %entry.id, error = %err, "outbox publish failed; will retry");
                    self.outbox.record_failure(entry.id, err.to_string()).await?;
                }
            }
        }
        Ok(())
    }
}
