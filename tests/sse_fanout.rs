//! `StreamingBridge` + `sse_stream` wired together: domain events published
//! on one end, mode-filtered SSE frames read off the other, the way a real
//! run/connection pair would see it.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::json;
use uuid::Uuid;
use weavegraph::bus::Handler;
use weavegraph::domain::event::DomainEvent;
use weavegraph::ids::RunId;
use weavegraph::streaming::broker::Broker;
use weavegraph::streaming::bridge::StreamingBridge;
use weavegraph::streaming::sse::{sse_stream, StreamMode};

fn run_event(run_id: RunId, event_type: &str, payload: serde_json::Value) -> DomainEvent {
    let event = DomainEvent::new("run", Uuid::new_v4(), 1, event_type, payload, Utc::now());
    DomainEvent {
        aggregate_id: run_id.as_uuid(),
        ..event
    }
}

#[tokio::test]
async fn events_mode_sees_every_frame_then_end_after_completion() {
    let broker = Arc::new(Broker::new());
    let bridge = StreamingBridge::new(broker.clone());
    let run_id = RunId::new();
    let mut stream = sse_stream(&broker, run_id, vec![StreamMode::Events]);

    bridge
        .handle(&run_event(run_id, "run.started", json!({})))
        .await
        .unwrap();
    bridge
        .handle(&run_event(
            run_id,
            "run.node_completed",
            json!({"node_id": "echo", "output": {"answer": 42}}),
        ))
        .await
        .unwrap();
    bridge
        .handle(&run_event(run_id, "run.completed", json!({"output": {}})))
        .await
        .unwrap();

    let wire_events: Vec<&'static str> = [
        stream.next().await.unwrap().event,
        stream.next().await.unwrap().event,
        stream.next().await.unwrap().event,
        stream.next().await.unwrap().event,
        stream.next().await.unwrap().event,
    ]
    .to_vec();
    assert_eq!(
        wire_events,
        vec!["run_started", "node_end", "values", "run_completed", "end"]
    );
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn values_mode_drops_everything_but_values_and_the_terminal_end_frame() {
    let broker = Arc::new(Broker::new());
    let bridge = StreamingBridge::new(broker.clone());
    let run_id = RunId::new();
    let mut stream = sse_stream(&broker, run_id, vec![StreamMode::Values]);

    bridge
        .handle(&run_event(run_id, "run.started", json!({})))
        .await
        .unwrap();
    bridge
        .handle(&run_event(
            run_id,
            "run.node_completed",
            json!({"node_id": "echo", "output": {"answer": 42}}),
        ))
        .await
        .unwrap();
    bridge
        .handle(&run_event(run_id, "run.completed", json!({"output": {}})))
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.event, "values");
    assert_eq!(first.data, json!({"answer": 42}));
    let second = stream.next().await.unwrap();
    assert_eq!(second.event, "end");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn events_from_a_different_run_never_cross_into_this_connection() {
    let broker = Arc::new(Broker::new());
    let bridge = StreamingBridge::new(broker.clone());
    let run_id = RunId::new();
    let other_run_id = RunId::new();
    let mut stream = sse_stream(&broker, run_id, vec![StreamMode::Events]);

    bridge
        .handle(&run_event(other_run_id, "run.started", json!({})))
        .await
        .unwrap();
    bridge
        .handle(&run_event(run_id, "run.completed", json!({"output": {}})))
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.event, "run_completed");
    let second = stream.next().await.unwrap();
    assert_eq!(second.event, "end");
}
