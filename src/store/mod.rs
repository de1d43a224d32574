//! Durable persistence for the orchestration service: event-sourced runs,
//! the transactional outbox, checkpoint history, and pending interrupts.
//!
//! Every trait here has an always-available `InMemory*` implementation
//! (used by tests and the in-memory deployment mode) and, behind the
//! `postgres` feature, a `Pg*` implementation built on raw `sqlx` queries
//! the way `runtimes::checkpointer_sqlite::SQLiteCheckpointer` is.

pub mod checkpoint_store;
pub mod event_store;
pub mod interrupt_store;
pub mod outbox;
pub mod repository;
pub mod thread_store;

pub use checkpoint_store::{CheckpointStore, InMemoryCheckpointStore};
pub use event_store::{EventStore, InMemoryEventStore};
pub use interrupt_store::{InMemoryInterruptStore, InterruptStore};
pub use outbox::{InMemoryOutbox, Outbox, OutboxEntry};
pub use repository::{InMemoryRunRepository, RunRepository};
pub use thread_store::{InMemoryThreadStore, ThreadStore};

#[cfg(feature = "postgres")]
pub use checkpoint_store::PgCheckpointStore;
#[cfg(feature = "postgres")]
pub use event_store::PgEventStore;
#[cfg(feature = "postgres")]
pub use interrupt_store::PgInterruptStore;
#[cfg(feature = "postgres")]
pub use outbox::PgOutbox;
#[cfg(feature = "postgres")]
pub use repository::PgRunRepository;
#[cfg(feature = "postgres")]
pub use thread_store::PgThreadStore;
