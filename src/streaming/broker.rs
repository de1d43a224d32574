//! Per-run broadcast topics the SSE fan-out subscribes against. Mirrors
//! `event_bus::hub::EventHub`'s single broadcast channel, generalized to one
//! channel per run id since subscribers only ever care about one run's
//! topic at a time.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;

use crate::ids::RunId;
use crate::streaming::stream_event::StreamEvent;

const DEFAULT_BUFFER_CAPACITY: usize = 1024;

#[derive(Default)]
pub struct Broker {
    topics: RwLock<FxHashMap<RunId, broadcast::Sender<StreamEvent>>>,
}

impl Broker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, run_id: RunId) -> broadcast::Sender<StreamEvent> {
        if let Some(sender) = self.topics.read().get(&run_id) {
            return sender.clone();
        }
        let mut topics = self.topics.write();
        topics
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(DEFAULT_BUFFER_CAPACITY).0)
            .clone()
    }

    /// Publish onto `run_id`'s topic. A `SendError` here only means nobody is
    /// currently subscribed — not a failure the caller needs to react to, the
    /// same way `EventHub::publish` tolerates zero subscribers.
    pub fn publish(&self, run_id: RunId, event: StreamEvent) {
        let _ = self.sender_for(run_id).send(event);
    }

    #[must_use]
    pub fn subscribe(&self, run_id: RunId) -> broadcast::Receiver<StreamEvent> {
        self.sender_for(run_id).subscribe()
    }

    /// Drop the topic once the run is known terminal and no new subscribers
    /// are expected; next publish/subscribe call lazily recreates it.
    pub fn close_topic(&self, run_id: RunId) {
        self.topics.write().remove(&run_id);
    }
}

pub type SharedBroker = Arc<Broker>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::stream_event::StreamEventKind;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_events_published_after_it_subscribes() {
        let broker = Broker::new();
        let run_id = RunId::new();
        let mut rx = broker.subscribe(run_id);

        broker.publish(
            run_id,
            StreamEvent::new(run_id, StreamEventKind::RunStarted, json!({}), Utc::now()),
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, StreamEventKind::RunStarted);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let broker = Broker::new();
        let run_id = RunId::new();
        broker.publish(
            run_id,
            StreamEvent::new(run_id, StreamEventKind::RunStarted, json!({}), Utc::now()),
        );
    }

    #[tokio::test]
    async fn distinct_runs_have_independent_topics() {
        let broker = Broker::new();
        let run_a = RunId::new();
        let run_b = RunId::new();
        let mut rx_a = broker.subscribe(run_a);
        let mut rx_b = broker.subscribe(run_b);

        broker.publish(
            run_a,
            StreamEvent::new(run_a, StreamEventKind::RunStarted, json!({}), Utc::now()),
        );

        assert!(rx_a.recv().await.is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
