//! Boolean-expression conditions for conditional edges.
//!
//! Graphs arrive as data over the wire, so the teacher's closure-based
//! `EdgePredicate` (`Arc<dyn Fn(StateSnapshot) -> Vec<String>>`) can't be
//! constructed from a JSON graph definition. `Condition` is a small AST
//! parsed once when a graph is registered and evaluated, side-effect-free,
//! against a `serde_json::Value` view of the thread's channel-values for
//! every step — the data-driven analogue of that predicate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A side-effect-free boolean expression over channel-values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// `path == literal`
    Eq { path: String, value: Value },
    /// `path != literal`
    Ne { path: String, value: Value },
    /// `path` resolves to a truthy JSON value (non-null, non-false, non-zero, non-empty).
    Truthy { path: String },
    /// Negation.
    Not { condition: Box<Condition> },
    /// All of the sub-conditions must hold.
    And { conditions: Vec<Condition> },
    /// Any of the sub-conditions must hold.
    Or { conditions: Vec<Condition> },
    /// Always matches — used for default/unconditional routing expressed
    /// explicitly rather than via `Option::None`.
    Always,
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConditionError {
    #[error("condition path `{0}` did not resolve against channel-values")]
    #[diagnostic(code(weavegraph::engine::condition::missing_path))]
    MissingPath(String),
}

impl Condition {
    /// Evaluate against a JSON snapshot of channel-values. Missing paths are
    /// treated as `null` for `Eq`/`Ne`/`Truthy` rather than erroring, since a
    /// condition referencing a channel a given node never set is a common,
    /// legitimate "didn't happen yet" case.
    #[must_use]
    pub fn evaluate(&self, channel_values: &Value) -> bool {
        match self {
            Condition::Eq { path, value } => resolve_path(channel_values, path) == Some(value),
            Condition::Ne { path, value } => resolve_path(channel_values, path) != Some(value),
            Condition::Truthy { path } => resolve_path(channel_values, path)
                .map(is_truthy)
                .unwrap_or(false),
            Condition::Not { condition } => !condition.evaluate(channel_values),
            Condition::And { conditions } => conditions.iter().all(|c| c.evaluate(channel_values)),
            Condition::Or { conditions } => conditions.iter().any(|c| c.evaluate(channel_values)),
            Condition::Always => true,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Resolve a dotted path (`"a.b.c"`) against a JSON object tree.
fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_matches_nested_path() {
        let cond = Condition::Eq {
            path: "category".to_string(),
            value: json!("A"),
        };
        assert!(cond.evaluate(&json!({"category": "A"})));
        assert!(!cond.evaluate(&json!({"category": "C"})));
    }

    #[test]
    fn missing_path_is_falsy_not_an_error() {
        let cond = Condition::Truthy {
            path: "approved".to_string(),
        };
        assert!(!cond.evaluate(&json!({})));
    }

    #[test]
    fn and_or_not_compose() {
        let cond = Condition::And {
            conditions: vec![
                Condition::Truthy {
                    path: "ready".to_string(),
                },
                Condition::Not {
                    condition: Box::new(Condition::Eq {
                        path: "category".to_string(),
                        value: json!("C"),
                    }),
                },
            ],
        };
        assert!(cond.evaluate(&json!({"ready": true, "category": "A"})));
        assert!(!cond.evaluate(&json!({"ready": true, "category": "C"})));
    }
}
