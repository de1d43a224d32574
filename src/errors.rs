//! Shared error-kind vocabulary used at every layer boundary.
//!
//! `RunError` is the one error type the `service`, `engine`, and `store`
//! modules return from their public, fallible operations. It carries a
//! stable `#[diagnostic(code(...))]` per variant so an outer HTTP layer can
//! map a kind to a status code without depending on HTTP types here, the
//! same separation `node::NodeError`/`channels::errors::LadderError` keep
//! between domain errors and their eventual presentation.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("invalid input: {0}")]
    #[diagnostic(code(weavegraph::invalid_input))]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    #[diagnostic(code(weavegraph::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    #[diagnostic(code(weavegraph::conflict))]
    Conflict(String),

    #[error("invalid state transition: {0}")]
    #[diagnostic(code(weavegraph::invalid_state))]
    InvalidState(String),

    #[error(
        "optimistic concurrency conflict on {aggregate} {id}: expected version {expected}, found {actual}"
    )]
    #[diagnostic(
        code(weavegraph::concurrency_conflict),
        help("Reload the aggregate and retry the command against its current version.")
    )]
    ConcurrencyConflict {
        aggregate: &'static str,
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("routing ambiguous at node {node}: {candidates} matching edges")]
    #[diagnostic(code(weavegraph::routing_ambiguous))]
    RoutingAmbiguous { node: String, candidates: usize },

    #[error("no matching edge out of node {node}")]
    #[diagnostic(
        code(weavegraph::no_matching_edge),
        help("Add a default/unconditional edge or a catch-all condition.")
    )]
    NoMatchingEdge { node: String },

    #[error("recursion limit exceeded after {steps} steps (limit {limit})")]
    #[diagnostic(
        code(weavegraph::max_iterations_exceeded),
        help("Raise the graph's recursion_limit or break the router cycle.")
    )]
    MaxIterationsExceeded { steps: u64, limit: u64 },

    #[error("operation timed out after {0:?}")]
    #[diagnostic(code(weavegraph::timeout))]
    Timeout(std::time::Duration),

    #[error(transparent)]
    #[diagnostic(code(weavegraph::internal))]
    Internal(#[from] InternalError),
}

/// Wraps lower-level failures (I/O, serialization, database) that don't map
/// to a named domain error kind but still need a `#[source]` chain.
#[derive(Debug, Error, Diagnostic)]
pub enum InternalError {
    #[error("serialization error: {0}")]
    #[diagnostic(code(weavegraph::internal::serde))]
    Serde(#[from] serde_json::Error),

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    #[diagnostic(code(weavegraph::internal::database))]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    #[diagnostic(code(weavegraph::internal::other))]
    Other(String),
}

impl RunError {
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(InternalError::Other(message.into()))
    }
}
