//! Opaque identifier newtypes for the aggregates this crate persists.
//!
//! Every id is a UUID wrapped in a distinct type so a `ThreadId` can never be
//! passed where a `RunId` is expected. Each implements `Display`, `FromStr`,
//! and serde (as a plain string) so they round-trip through JSON bodies and
//! Postgres `uuid` columns (`sqlx`'s `uuid` feature maps `Uuid` directly).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[must_use]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(RunId);
id_newtype!(ThreadId);
id_newtype!(AssistantId);
id_newtype!(GraphId);
id_newtype!(CheckpointId);
id_newtype!(InterruptId);
id_newtype!(EventId);
id_newtype!(OutboxId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_from_str_round_trip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_id_types_wrapping_the_same_uuid_are_not_interchangeable() {
        let raw = Uuid::new_v4();
        let run_id = RunId::from_uuid(raw);
        let thread_id = ThreadId::from_uuid(raw);
        assert_eq!(run_id.as_uuid(), thread_id.as_uuid());
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn from_str_rejects_garbage() {
        assert!("not-a-uuid".parse::<RunId>().is_err());
    }
}
