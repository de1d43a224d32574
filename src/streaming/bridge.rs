//! Subscribes to run-lifecycle domain events on the in-process bus and
//! re-publishes translated `StreamEvent`s onto the per-run broker topic, per
//! the streaming bridge design: `NodeCompleted` fans out to both `node_end`
//! and `values`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::bus::Handler;
use crate::domain::event::DomainEvent;
use crate::errors::RunError;
use crate::ids::RunId;
use crate::streaming::broker::Broker;
use crate::streaming::stream_event::{StreamEvent, StreamEventKind};

pub struct StreamingBridge {
    broker: Arc<Broker>,
}

impl StreamingBridge {
    #[must_use]
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    fn translate(event: &DomainEvent) -> Vec<(StreamEventKind, Value)> {
        match event.event_type.as_str() {
            "run.started" => vec![(StreamEventKind::RunStarted, event.payload.clone())],
            "run.node_started" => vec![(StreamEventKind::NodeStart, event.payload.clone())],
            "run.node_completed" => {
                let values = event
                    .payload
                    .get("output")
                    .cloned()
                    .unwrap_or(Value::Null);
                vec![
                    (StreamEventKind::NodeEnd, event.payload.clone()),
                    (StreamEventKind::Values, values),
                ]
            }
            "run.node_failed" => vec![(StreamEventKind::Error, event.payload.clone())],
            "run.requires_action" => {
                vec![(StreamEventKind::RequiresAction, event.payload.clone())]
            }
            "run.completed" => vec![(StreamEventKind::RunCompleted, event.payload.clone())],
            "run.failed" | "run.timed_out" | "run.cancelled" => {
                vec![(StreamEventKind::RunFailed, event.payload.clone())]
            }
            // run.created, run.resumed, run.node_skipped carry no subscriber-facing frame.
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Handler for StreamingBridge {
    async fn handle(&self, event: &DomainEvent) -> Result<(), RunError> {
        if event.aggregate_type != "run" {
            return Ok(());
        }
        let run_id = RunId::from_uuid(event.aggregate_id);
        for (kind, payload) in Self::translate(event) {
            self.broker.publish(
                run_id,
                StreamEvent::new(run_id, kind, payload, event.occurred_at),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(event_type: &str, aggregate_type: &str, payload: Value) -> DomainEvent {
        DomainEvent::new(aggregate_type, Uuid::new_v4(), 1, event_type, payload, Utc::now())
    }

    #[test]
    fn node_completed_fans_out_to_node_end_and_values() {
        let e = event(
            "run.node_completed",
            "run",
            json!({"node_id": "n1", "output": {"answer": 42}}),
        );
        let translated = StreamingBridge::translate(&e);
        assert_eq!(translated.len(), 2);
        assert_eq!(translated[0].0, StreamEventKind::NodeEnd);
        assert_eq!(translated[1].0, StreamEventKind::Values);
        assert_eq!(translated[1].1, json!({"answer": 42}));
    }

    #[test]
    fn node_completed_without_output_yields_null_values_frame() {
        let e = event("run.node_completed", "run", json!({"node_id": "n1"}));
        let translated = StreamingBridge::translate(&e);
        assert_eq!(translated[1].1, Value::Null);
    }

    #[test]
    fn terminal_variants_all_translate_to_run_failed() {
        for event_type in ["run.failed", "run.timed_out", "run.cancelled"] {
            let e = event(event_type, "run", json!({}));
            let translated = StreamingBridge::translate(&e);
            assert_eq!(translated, vec![(StreamEventKind::RunFailed, json!({}))]);
        }
    }

    #[test]
    fn lifecycle_events_with_no_subscriber_frame_translate_to_nothing() {
        for event_type in ["run.created", "run.resumed", "run.node_skipped"] {
            let e = event(event_type, "run", json!({}));
            assert!(StreamingBridge::translate(&e).is_empty());
        }
    }

    #[tokio::test]
    async fn handle_publishes_translated_frame_onto_the_run_topic() {
        let broker = Arc::new(Broker::new());
        let bridge = StreamingBridge::new(broker.clone());
        let run_id = RunId::new();
        let e = event("run.started", "run", json!({"foo": "bar"}));
        let e = DomainEvent {
            aggregate_id: run_id.as_uuid(),
            ..e
        };

        let mut rx = broker.subscribe(run_id);
        bridge.handle(&e).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, StreamEventKind::RunStarted);
        assert_eq!(received.payload, json!({"foo": "bar"}));
    }

    #[tokio::test]
    async fn handle_ignores_events_from_non_run_aggregates() {
        let broker = Arc::new(Broker::new());
        let bridge = StreamingBridge::new(broker.clone());
        let run_id = RunId::new();
        let e = DomainEvent {
            aggregate_id: run_id.as_uuid(),
            ..event("thread.updated", "thread", json!({}))
        };

        let mut rx = broker.subscribe(run_id);
        bridge.handle(&e).await.unwrap();

        assert!(rx.try_recv().is_err());
    }
}
