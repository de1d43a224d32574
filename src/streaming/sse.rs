//! SSE frame formatting and the mode-filtered per-connection fan-out.
//! One task per open connection is expected to drive the stream this module
//! builds (see the scheduling model this crate follows).

use std::str::FromStr;

use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::ids::RunId;
use crate::streaming::broker::Broker;
use crate::streaming::stream_event::{StreamEvent, StreamEventKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    Events,
    Values,
    Messages,
    Updates,
    Debug,
}

impl StreamMode {
    #[must_use]
    pub fn allows(self, kind: StreamEventKind) -> bool {
        use StreamEventKind::*;
        match self {
            Self::Events => true,
            Self::Values => matches!(kind, Values | End),
            Self::Messages => matches!(kind, Message | MessageChunk | End),
            Self::Updates => matches!(kind, Updates | End),
            Self::Debug => true,
        }
    }
}

impl FromStr for StreamMode {
    type Err = crate::errors::RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(Self::Events),
            "values" => Ok(Self::Values),
            "messages" => Ok(Self::Messages),
            "updates" => Ok(Self::Updates),
            "debug" => Ok(Self::Debug),
            other => Err(crate::errors::RunError::InvalidInput(format!(
                "unknown stream mode: {other}"
            ))),
        }
    }
}

/// Parse a `?modes=a,b,c` query value. An empty or absent selector defaults
/// to `events`, matching the spec's default mode.
#[must_use]
pub fn parse_modes(raw: Option<&str>) -> Vec<StreamMode> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return vec![StreamMode::Events];
    };
    let modes: Vec<StreamMode> = raw.split(',').filter_map(|m| m.trim().parse().ok()).collect();
    if modes.is_empty() {
        vec![StreamMode::Events]
    } else {
        modes
    }
}

pub struct SseFrame {
    pub event: &'static str,
    pub data: Value,
}

impl SseFrame {
    #[must_use]
    pub fn render(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }

    fn from_stream_event(event: &StreamEvent) -> Self {
        Self {
            event: event.kind.as_wire_str(),
            data: event.payload.clone(),
        }
    }

    fn end() -> Self {
        Self {
            event: StreamEventKind::End.as_wire_str(),
            data: Value::Null,
        }
    }
}

enum FanOutState {
    Open(broadcast::Receiver<StreamEvent>, Vec<StreamMode>),
    NeedsEnd,
    Closed,
}

/// Build the filtered, terminal-aware SSE frame stream for one connection.
/// Late joiners only see events from the point of subscription onward;
/// recovering history is the run/thread query endpoints' job, not this
/// stream's.
#[must_use]
pub fn sse_stream(broker: &Broker, run_id: RunId, modes: Vec<StreamMode>) -> BoxStream<'static, SseFrame> {
    let receiver = broker.subscribe(run_id);
    stream::unfold(FanOutState::Open(receiver, modes), |state| async move {
        let (mut receiver, modes) = match state {
            FanOutState::Closed => return None,
            FanOutState::NeedsEnd => return Some((SseFrame::end(), FanOutState::Closed)),
            FanOutState::Open(receiver, modes) => (receiver, modes),
        };
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let terminal = event.kind.is_terminal();
                    if modes.iter().any(|m| m.allows(event.kind)) {
                        let frame = SseFrame::from_stream_event(&event);
                        let next = if terminal {
                            FanOutState::NeedsEnd
                        } else {
                            FanOutState::Open(receiver, modes)
                        };
                        return Some((frame, next));
                    }
                    if terminal {
                        return Some((SseFrame::end(), FanOutState::Closed));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Some((SseFrame::end(), FanOutState::Closed));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn parse_modes_defaults_to_events() {
        assert_eq!(parse_modes(None), vec![StreamMode::Events]);
        assert_eq!(parse_modes(Some("")), vec![StreamMode::Events]);
    }

    #[test]
    fn parse_modes_reads_comma_separated_list() {
        assert_eq!(
            parse_modes(Some("values,updates")),
            vec![StreamMode::Values, StreamMode::Updates]
        );
    }

    #[test]
    fn values_mode_admits_only_values_and_end() {
        assert!(StreamMode::Values.allows(StreamEventKind::Values));
        assert!(StreamMode::Values.allows(StreamEventKind::End));
        assert!(!StreamMode::Values.allows(StreamEventKind::MessageChunk));
    }

    #[tokio::test]
    async fn fan_out_appends_end_frame_after_terminal_event() {
        let broker = Broker::new();
        let run_id = RunId::new();
        let mut stream = sse_stream(&broker, run_id, vec![StreamMode::Events]);

        broker.publish(
            run_id,
            StreamEvent::new(
                run_id,
                StreamEventKind::RunCompleted,
                Value::Null,
                Utc::now(),
            ),
        );

        let first = stream.next().await.unwrap();
        assert_eq!(first.event, "run_completed");
        let second = stream.next().await.unwrap();
        assert_eq!(second.event, "end");
        assert!(stream.next().await.is_none());
    }
}
