// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry.
//!
//! The [`Tool`] trait defines the interface game tools implement. The
//! [`ToolRegistry`] manages lookup by name, exports provider-format tool
//! specs, and executes a model's tool call batch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parley_core::chat::{ChatMessage, ToolCall, ToolSpec};
use parley_core::ParleyError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Output from a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The content returned by the tool (text output, JSON, etc.).
    pub content: String,
    /// Whether the tool invocation resulted in an error.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Unified trait for game tools.
///
/// Every tool provides a name, description, JSON Schema for its
/// parameters, and an async `invoke` method called with the parsed JSON
/// arguments from the model's tool call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's unique name (used for lookup and API serialization).
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON Schema describing the tool's input parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Invokes the tool with the given JSON input and returns the output.
    async fn invoke(&self, input: serde_json::Value) -> Result<ToolOutput, ParleyError>;
}

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool. The tool is indexed by its `name()`.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns provider-format specs for all registered tools, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Returns provider-format specs for a named subset, skipping unknown names.
    pub fn specs_for(&self, names: &[&str]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Executes a batch of tool calls concurrently.
    ///
    /// Errors are isolated per call: an unknown tool, unparseable
    /// arguments, or a failing invocation each produce an error-text tool
    /// message for that call while the rest of the batch proceeds. The
    /// returned messages are in the same order as `calls`.
    pub async fn handle_tool_calls(&self, calls: &[ToolCall]) -> Vec<ChatMessage> {
        let futures = calls.iter().map(|call| self.handle_one(call));
        join_all(futures).await
    }

    async fn handle_one(&self, call: &ToolCall) -> ChatMessage {
        let output = match self.get(&call.name) {
            Some(tool) => match serde_json::from_str::<serde_json::Value>(&call.arguments) {
                Ok(input) => {
                    debug!(tool = %call.name, call_id = %call.id, "invoking tool");
                    match tool.invoke(input).await {
                        Ok(output) => output,
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool invocation failed");
                            ToolOutput::error(format!("tool '{}' failed: {e}", call.name))
                        }
                    }
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "unparseable tool arguments");
                    ToolOutput::error(format!("invalid arguments for '{}': {e}", call.name))
                }
            },
            None => {
                warn!(tool = %call.name, "unknown tool requested");
                ToolOutput::error(format!("unknown tool: {}", call.name))
            }
        };

        let mut message = ChatMessage::plain("tool", output.content);
        message.tool_call_id = Some(call.id.clone());
        message
    }

    /// Returns the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the input back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "Message to echo" }
                },
                "required": ["message"]
            })
        }

        async fn invoke(&self, input: serde_json::Value) -> Result<ToolOutput, ParleyError> {
            let message = input["message"].as_str().unwrap_or("no message").to_string();
            Ok(ToolOutput::ok(message))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn invoke(&self, _input: serde_json::Value) -> Result<ToolOutput, ParleyError> {
            Err(ParleyError::Internal("boom".into()))
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn registers_and_retrieves_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn specs_are_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailingTool));

        let specs = registry.specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "broken");
        assert_eq!(specs[1].name, "echo");
        assert!(specs[1].parameters["properties"]["message"].is_object());
    }

    #[test]
    fn specs_for_skips_unknown_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let specs = registry.specs_for(&["echo", "missing"]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
    }

    #[tokio::test]
    async fn batch_preserves_order_and_call_ids() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let calls = vec![
            call("call_1", "echo", r#"{"message":"first"}"#),
            call("call_2", "echo", r#"{"message":"second"}"#),
        ];
        let messages = registry.handle_tool_calls(&calls).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[1].content, "second");
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("call_2"));
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailingTool));

        let calls = vec![
            call("call_1", "broken", "{}"),
            call("call_2", "missing", "{}"),
            call("call_3", "echo", "not json"),
            call("call_4", "echo", r#"{"message":"still works"}"#),
        ];
        let messages = registry.handle_tool_calls(&calls).await;
        assert!(messages[0].content.contains("failed"));
        assert!(messages[1].content.contains("unknown tool"));
        assert!(messages[2].content.contains("invalid arguments"));
        assert_eq!(messages[3].content, "still works");
    }
}
