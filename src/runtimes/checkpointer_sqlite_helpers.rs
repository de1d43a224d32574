//! Small JSON (de)serialization helpers shared by `checkpointer_sqlite`'s
//! `save`/`load` paths, factored out so each call site names the field it's
//! touching instead of repeating the same `map_err` boilerplate.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::checkpointer::{CheckpointerError, Result};

/// Serialize `value` to a JSON string, tagging errors with `field` so a
/// failure points at which column it was writing.
pub(super) fn serialize_json<T: Serialize>(value: &T, field: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CheckpointerError::Other {
        message: format!("{field} serialize: {e}"),
    })
}

/// Parse a JSON string column into a generic [`Value`].
pub(super) fn deserialize_json(raw: &str, field: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| CheckpointerError::Other {
        message: format!("{field} deserialize: {e}"),
    })
}

/// Convert an already-parsed [`Value`] into `T`.
pub(super) fn deserialize_json_value<T: DeserializeOwned>(value: Value, field: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CheckpointerError::Other {
        message: format!("{field} convert: {e}"),
    })
}

/// Unwrap an `Option<String>` read from a nullable column, erroring when the
/// row doesn't carry the field a caller already checked should be present.
pub(super) fn require_json_field(raw: Option<String>, field: &'static str) -> Result<String> {
    raw.ok_or(CheckpointerError::Other {
        message: format!("missing field: {field}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_then_deserialize_round_trips_a_value() {
        let raw = serialize_json(&json!({"a": 1}), "test").unwrap();
        let value = deserialize_json(&raw, "test").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn deserialize_json_value_converts_into_the_target_type() {
        let parsed: Vec<String> =
            deserialize_json_value(json!(["a", "b"]), "list").unwrap();
        assert_eq!(parsed, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn require_json_field_errors_on_none() {
        assert!(require_json_field(None, "state_json").is_err());
        assert!(require_json_field(Some("{}".to_string()), "state_json").is_ok());
    }
}
