//! Translates run/node lifecycle domain events into consumer-facing stream
//! events and fans them out to per-connection, mode-filtered SSE streams.
//! HTTP plumbing (routing, auth, connection handling) is out of scope here;
//! this module only builds the frame stream an HTTP layer would drive.

pub mod bridge;
pub mod broker;
pub mod sse;
pub mod stream_event;

pub use bridge::StreamingBridge;
pub use broker::{Broker, SharedBroker};
pub use sse::{parse_modes, sse_stream, SseFrame, StreamMode};
pub use stream_event::{StreamEvent, StreamEventKind};
