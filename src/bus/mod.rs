//! Typed, in-process pub/sub for intra-process reactions to domain
//! events (projections, the SSE streaming bridge). This is deliberately not
//! a durability boundary — durability comes from `store::event_store` and
//! `store::outbox`; handlers here must tolerate at-least-once delivery the
//! same way `event_bus::sink::EventSink` implementations tolerate replay
//! after a lagged broadcast receiver.
//!
//! Subscriptions are keyed by event-type string (`DomainEvent::event_type`),
//! the same coarse routing `event_bus::event::Event::scope_label` gives
//! sinks, generalized here to dynamic strings instead of a closed enum since
//! the event types this bus carries are produced across every aggregate.

mod handler;
mod publish;

pub use handler::{Handler, HandlerFn};
pub use publish::{HandlerFailure, PublishMode};

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::domain::event::DomainEvent;

/// Catch-all subscription key: a handler registered under this key receives
/// every published event regardless of its `event_type`.
pub const WILDCARD: &str = "*";

/// The in-process bus itself. Cheap to clone (all state is behind an `Arc`),
/// the same ergonomic an `EventBus::get_emitter()` handle offers.
#[derive(Clone, Default)]
pub struct Bus {
    handlers: Arc<RwLock<FxHashMap<String, Vec<Arc<dyn Handler>>>>>,
}

impl Bus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events whose `event_type` equals `event_type`,
    /// or for every event when `event_type` is [`WILDCARD`].
    pub fn subscribe(&self, event_type: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers
            .write()
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    /// Deliver `event` to every handler subscribed to its `event_type` plus
    /// every wildcard subscriber.
    ///
    /// `PublishMode::Parallel` runs each handler on its own task and waits
    /// for all of them, collecting every failure. `PublishMode::Sequential`
    /// runs handlers in subscription order and stops at the first failure.
    pub async fn publish(
        &self,
        event: DomainEvent,
        mode: PublishMode,
    ) -> Result<(), Vec<HandlerFailure>> {
        let targets: Vec<Arc<dyn Handler>> = {
            let handlers = self.handlers.read();
            let mut targets = Vec::new();
            if let Some(exact) = handlers.get(event.event_type.as_str()) {
                targets.extend(exact.iter().cloned());
            }
            if event.event_type != WILDCARD {
                if let Some(wild) = handlers.get(WILDCARD) {
                    targets.extend(wild.iter().cloned());
                }
            }
            targets
        };

        publish::dispatch(&event, targets, mode).await
    }
}
