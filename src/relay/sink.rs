//! Where the outbox relay delivers a claimed entry. No external broker
//! client ships in this crate (`config::AppConfig::broker_url` is carried
//! for an operator's own integration); the default sink re-publishes onto
//! the in-process bus, where the streaming bridge and any projections pick
//! it up.

use async_trait::async_trait;
use std::sync::Arc;

use crate::bus::{Bus, PublishMode};
use crate::domain::event::DomainEvent;
use crate::errors::RunError;
use crate::store::outbox::OutboxEntry;

#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, entry: &OutboxEntry) -> Result<(), RunError>;
}

/// Re-publishes a claimed outbox entry onto the in-process bus. The
/// reconstructed `DomainEvent.aggregate_version` is not meaningful here —
/// the outbox doesn't carry it — so it's always zero; nothing downstream of
/// this sink keys on it.
pub struct BusPublishSink {
    bus: Arc<Bus>,
    mode: PublishMode,
}

impl BusPublishSink {
    #[must_use]
    pub fn new(bus: Arc<Bus>, mode: PublishMode) -> Self {
        Self { bus, mode }
    }
}

#[async_trait]
impl PublishSink for BusPublishSink {
    async fn publish(&self, entry: &OutboxEntry) -> Result<(), RunError> {
        let event = DomainEvent::new(
            entry.aggregate_type.clone(),
            entry.aggregate_id,
            0,
            entry.event_type.clone(),
            entry.payload.clone(),
            entry.created_at,
        )
        .with_metadata(entry.metadata.clone());

        self.bus
            .publish(event, self.mode)
            .await
            .map_err(|failures| {
                RunError::internal(format!(
                    "{} handler(s) failed publishing outbox entry {}",
                    failures.len(),
                    entry.id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Handler;
    use crate::store::outbox::OutboxEntry;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn sample_entry() -> OutboxEntry {
        OutboxEntry {
            id: crate::ids::OutboxId::new(),
            event_id: Uuid::new_v4(),
            aggregate_type: "run".to_string(),
            aggregate_id: Uuid::new_v4(),
            event_type: "run.started".to_string(),
            payload: json!({"ok": true}),
            metadata: json!({"trace": "abc"}),
            published: false,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    struct RecordingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for RecordingHandler {
        async fn handle(&self, event: &DomainEvent) -> Result<(), RunError> {
            assert_eq!(event.aggregate_type, "run");
            assert_eq!(event.metadata, json!({"trace": "abc"}));
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn bus_publish_sink_delivers_reconstructed_event_to_matching_handler() {
        let bus = Arc::new(Bus::new());
        let received = Arc::new(AtomicUsize::new(0));
        bus.subscribe("run.started", Arc::new(RecordingHandler(received.clone())));

        let sink = BusPublishSink::new(bus, PublishMode::Sequential);
        sink.publish(&sample_entry()).await.unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
