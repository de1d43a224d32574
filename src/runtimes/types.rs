//! Small typed wrappers for runtime identifiers, standing in for the raw
//! `String`/`u64` values `AppRunner`'s session map and `Checkpoint::step`
//! use internally. Not threaded through the runner itself; callers that want
//! typed handles instead of bare primitives reach for these directly.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh, collision-resistant session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepNumber(u64);

impl StepNumber {
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }

    /// Saturating successor; a step counter at `u64::MAX` stays there rather
    /// than wrapping to `0`.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for StepNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_wraps_a_plain_string() {
        let id = SessionId::new("test_session");
        assert_eq!(id.as_str(), "test_session");
        assert_eq!(id.to_string(), "test_session");
    }

    #[test]
    fn generated_session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn step_number_next_is_saturating() {
        let max_step = StepNumber::new(u64::MAX);
        assert_eq!(max_step.next().value(), u64::MAX);
    }
}
