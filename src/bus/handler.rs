use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::event::DomainEvent;
use crate::errors::RunError;

/// One intra-process reaction to a published domain event. Implementors are
/// the streaming bridge (forwarding to SSE connections) and read-model
/// projections; both must be safe to invoke more than once for the same
/// event under at-least-once delivery.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), RunError>;
}

type BoxedFuture = Pin<Box<dyn Future<Output = Result<(), RunError>> + Send>>;

/// Adapts a plain async closure into a [`Handler`], for subscribers that
/// don't need their own struct.
pub struct HandlerFn<F> {
    func: F,
}

impl<F> HandlerFn<F>
where
    F: Fn(&DomainEvent) -> BoxedFuture + Send + Sync,
{
    pub fn new(func: F) -> Arc<Self> {
        Arc::new(Self { func })
    }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(&DomainEvent) -> BoxedFuture + Send + Sync,
{
    async fn handle(&self, event: &DomainEvent) -> Result<(), RunError> {
        (self.func)(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[tokio::test]
    async fn handler_fn_adapts_a_closure_into_a_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let handler = HandlerFn::new(move |_event: &DomainEvent| {
            let count = count_clone.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }) as BoxedFuture
        });

        let event = DomainEvent::new(
            "run",
            Uuid::new_v4(),
            1,
            "run.created",
            serde_json::json!({}),
            Utc::now(),
        );
        handler.handle(&event).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
