use std::sync::Arc;

use thiserror::Error;

use super::handler::Handler;
use crate::domain::event::DomainEvent;
use crate::errors::RunError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishMode {
    /// Run every matching handler on its own task and wait for all of them.
    /// A slow or stuck handler never blocks the others.
    Parallel,
    /// Run handlers in subscription order; stop and report at the first
    /// failure instead of invoking the remaining handlers.
    Sequential,
}

#[derive(Debug, Error)]
#[error("handler failed: {source}")]
pub struct HandlerFailure {
    #[source]
    pub source: RunError,
}

pub(super) async fn dispatch(
    event: &DomainEvent,
    targets: Vec<Arc<dyn Handler>>,
    mode: PublishMode,
) -> Result<(), Vec<HandlerFailure>> {
    match mode {
        PublishMode::Sequential => {
            for handler in &targets {
                if let Err(source) = handler.handle(event).await {
                    return Err(vec![HandlerFailure { source }]);
                }
            }
            Ok(())
        }
        PublishMode::Parallel => {
            let event = event.clone();
            let mut tasks = Vec::with_capacity(targets.len());
            for handler in targets {
                let event = event.clone();
                tasks.push(tokio::spawn(
                    async move { handler.handle(&event).await },
                ));
            }

            let mut failures = Vec::new();
            for task in tasks {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => failures.push(HandlerFailure { source }),
                    Err(join_err) => failures.push(HandlerFailure {
                        source: RunError::internal(format!("handler task panicked: {join_err}")),
                    }),
                }
            }

            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures)
            }
        }
    }
}
