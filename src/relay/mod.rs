//! The outbox relay and cleanup worker: the two independent periodic tasks
//! the scheduling model describes alongside the engine's worker tasks and
//! the SSE fan-out's per-connection tasks.

pub mod cleanup;
pub mod outbox_relay;
pub mod sink;

pub use cleanup::CleanupWorker;
pub use outbox_relay::OutboxRelay;
pub use sink::{BusPublishSink, PublishSink};
