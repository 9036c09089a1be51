// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast a rendered message to the client.

use async_trait::async_trait;
use parley_core::ParleyError;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::context::WorkflowContext;
use crate::node::{NodeOutcome, NodeServices, WorkflowNode};
use crate::template;

/// Renders `content_template` over the node inputs (falling back to
/// `initial_message`) and broadcasts it with the configured role.
pub struct MessageNode {
    id: String,
    content_template: String,
    initial_message: String,
    role: String,
}

impl MessageNode {
    pub fn new(id: impl Into<String>, config: &Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            content_template: str_config(config, "content_template"),
            initial_message: str_config(config, "initial_message"),
            role: config
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("system")
                .to_string(),
        }
    }
}

fn str_config(config: &Map<String, Value>, key: &str) -> String {
    config
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl WorkflowNode for MessageNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "message"
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError> {
        let content = if self.content_template.is_empty() {
            self.initial_message.clone()
        } else {
            template::render(&self.content_template, &ctx.current_node_inputs)
        };
        debug!(node = %self.id, "message node broadcasting");

        ctx.emit(json!({
            "type": "message",
            "role": self.role,
            "content": content,
            "node_id": self.id,
        }));

        let mut output = Map::new();
        output.insert("message".to_string(), Value::String(content));
        Ok(NodeOutcome::completed(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::SessionId;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn config(raw: Value) -> Map<String, Value> {
        match raw {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn services() -> NodeServices {
        crate::nodes::tests::bare_services()
    }

    #[tokio::test]
    async fn renders_template_from_inputs() {
        let node = MessageNode::new(
            "m1",
            &config(json!({"content_template": "Welcome, {{name}}!"})),
        );
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.current_node_inputs
            .insert("name".into(), json!("alice"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);

        let outcome = node.run(&mut ctx, &services()).await.unwrap();
        assert_eq!(outcome.output["message"], json!("Welcome, alice!"));

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["role"], "system");
        assert_eq!(frame["content"], "Welcome, alice!");
        assert_eq!(frame["node_id"], "m1");
    }

    #[tokio::test]
    async fn falls_back_to_initial_message() {
        let node = MessageNode::new(
            "m2",
            &config(json!({"initial_message": "The game begins.", "role": "narrator"})),
        );
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);

        let outcome = node.run(&mut ctx, &services()).await.unwrap();
        assert_eq!(outcome.output["message"], json!("The game begins."));
        assert_eq!(rx.try_recv().unwrap()["role"], "narrator");
    }
}
