//! Node executors: the plugin capability set the graph engine dispatches on.
//!
//! Distinct from `node::Node` — the teacher's lower-level, closure-friendly
//! trait the in-process scheduler drives per superstep. `NodeExecutor` is the
//! one capability set a graph *definition* node resolves to: a named,
//! schema-carrying plugin looked up by `GraphDefinition`'s `NodeType`,
//! invoked with the node's config and the thread's current channel-values,
//! and returning updates plus an optional interrupt request. Only a handful
//! of deterministic executors ship here; LLM/tool-provider executors are an
//! external-integration concern this crate exposes the trait for but does
//! not implement.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::graph_def::NodeType;
use crate::errors::RunError;

/// What an executor invocation asks the engine to do next.
#[derive(Clone, Debug, Default)]
pub struct ExecutorOutcome {
    /// Channel-value updates to merge, keyed by channel name.
    pub updates: FxHashMap<String, Value>,
    /// Set when the node needs to pause for human or tool input.
    pub interrupt: Option<InterruptRequest>,
}

#[derive(Clone, Debug)]
pub struct InterruptRequest {
    pub reason: crate::domain::interrupt::InterruptReason,
    pub tool_calls: Vec<Value>,
}

impl ExecutorOutcome {
    #[must_use]
    pub fn updates(updates: FxHashMap<String, Value>) -> Self {
        Self {
            updates,
            interrupt: None,
        }
    }

    #[must_use]
    pub fn interrupted(
        updates: FxHashMap<String, Value>,
        reason: crate::domain::interrupt::InterruptReason,
        tool_calls: Vec<Value>,
    ) -> Self {
        Self {
            updates,
            interrupt: Some(InterruptRequest { reason, tool_calls }),
        }
    }
}

/// One node-type plugin: `{name, schema, invoke}`.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// JSON Schema describing this executor's `config` shape. `Value::Null`
    /// means "accepts any config" (the test executors below).
    fn schema(&self) -> Value {
        Value::Null
    }

    async fn invoke(
        &self,
        node_id: &str,
        config: &Value,
        channel_values: &Value,
    ) -> Result<ExecutorOutcome, RunError>;
}

/// Dispatch table from `NodeType` to the executor that implements it.
/// An instance with an explicit lifetime, not a process-wide singleton — the
/// same discipline `ReducerRegistry` keeps for reducers.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: FxHashMap<&'static str, Arc<dyn NodeExecutor>>,
    by_type: FxHashMap<NodeTypeKey, &'static str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct NodeTypeKey(NodeType);

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) {
        let name = executor.name();
        self.executors.insert(name, executor);
        self.by_type.insert(NodeTypeKey(node_type), name);
    }

    #[must_use]
    pub fn resolve(&self, node_type: NodeType) -> Option<Arc<dyn NodeExecutor>> {
        self.by_type
            .get(&NodeTypeKey(node_type))
            .and_then(|name| self.executors.get(name))
            .cloned()
    }
}

/// Deterministic passthrough executor: copies its config straight into the
/// named output channel. Used for `input`/`output` nodes and in tests that
/// don't need a real LLM/tool provider.
pub struct PassthroughExecutor {
    name: &'static str,
    output_channel: String,
}

impl PassthroughExecutor {
    #[must_use]
    pub fn new(name: &'static str, output_channel: impl Into<String>) -> Self {
        Self {
            name,
            output_channel: output_channel.into(),
        }
    }
}

#[async_trait]
impl NodeExecutor for PassthroughExecutor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn invoke(
        &self,
        _node_id: &str,
        config: &Value,
        _channel_values: &Value,
    ) -> Result<ExecutorOutcome, RunError> {
        let mut updates = FxHashMap::default();
        updates.insert(self.output_channel.clone(), config.clone());
        Ok(ExecutorOutcome::updates(updates))
    }
}

/// Deterministic router executor: reads a field out of `channel_values` and
/// writes it back verbatim so a conditional edge can key off it. Routing
/// itself lives in `engine::step`, not here — this only shapes the value the
/// edge conditions read.
pub struct EchoRouterExecutor {
    pub field: String,
}

#[async_trait]
impl NodeExecutor for EchoRouterExecutor {
    fn name(&self) -> &'static str {
        "echo_router"
    }

    async fn invoke(
        &self,
        _node_id: &str,
        config: &Value,
        channel_values: &Value,
    ) -> Result<ExecutorOutcome, RunError> {
        let value = config
            .get(&self.field)
            .or_else(|| channel_values.get(&self.field))
            .cloned()
            .unwrap_or(Value::Null);
        let mut updates = FxHashMap::default();
        updates.insert(self.field.clone(), value);
        Ok(ExecutorOutcome::updates(updates))
    }
}

/// Always pauses, carrying `config.tool_calls` (or an empty list) onto the
/// interrupt request. Stands in for a real tool/LLM executor in tests that
/// exercise the interrupt/resume protocol without a provider dependency.
pub struct AlwaysInterruptExecutor;

#[async_trait]
impl NodeExecutor for AlwaysInterruptExecutor {
    fn name(&self) -> &'static str {
        "always_interrupt"
    }

    async fn invoke(
        &self,
        _node_id: &str,
        config: &Value,
        _channel_values: &Value,
    ) -> Result<ExecutorOutcome, RunError> {
        let tool_calls = config
            .get("tool_calls")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(ExecutorOutcome::interrupted(
            FxHashMap::default(),
            crate::domain::interrupt::InterruptReason::ToolCall,
            tool_calls,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn passthrough_copies_config_into_channel() {
        let exec = PassthroughExecutor::new("input", "query");
        let out = exec
            .invoke("n1", &json!({"q": "hi"}), &json!({}))
            .await
            .unwrap();
        assert_eq!(out.updates.get("query"), Some(&json!({"q": "hi"})));
        assert!(out.interrupt.is_none());
    }

    #[test]
    fn registry_resolves_by_node_type() {
        let mut registry = ExecutorRegistry::new();
        registry.register(NodeType::Input, Arc::new(PassthroughExecutor::new("input", "query")));
        assert!(registry.resolve(NodeType::Input).is_some());
        assert!(registry.resolve(NodeType::Llm).is_none());
    }
}
