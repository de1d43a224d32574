//! Opaque id generation for runs, sessions, and other aggregates.

use uuid::Uuid;

/// Generates string-encoded ids. Kept as a small type (rather than bare
/// `Uuid::new_v4().to_string()` calls scattered everywhere) so callers can
/// swap the scheme later without touching every call site.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn generate_run_id(&self) -> String {
        format!("run_{}", Uuid::new_v4())
    }

    #[must_use]
    pub fn generate_session_id(&self) -> String {
        format!("session_{}", Uuid::new_v4())
    }

    #[must_use]
    pub fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
