// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The human-input gate.
//!
//! The node never blocks on input. It inspects `user_message` in the
//! context: empty means suspend (broadcast the turn prompt, return
//! Waiting), non-empty means consume it and complete. A per-node
//! `{id}_processed` flag stops a loop from re-consuming the same message
//! on the next iteration.

use async_trait::async_trait;
use parley_core::ParleyError;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::context::WorkflowContext;
use crate::node::{NodeOutcome, NodeServices, WorkflowNode};

pub const DEFAULT_RESULT_KEY: &str = "player_turn_result";

pub struct PlayerTurnNode {
    id: String,
    turn_message: String,
    result_key: String,
}

impl PlayerTurnNode {
    pub fn new(id: impl Into<String>, config: &Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            turn_message: config
                .get("turn_message")
                .and_then(Value::as_str)
                .unwrap_or("It is your turn.")
                .to_string(),
            result_key: config
                .get("result_key")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_RESULT_KEY)
                .to_string(),
        }
    }

    fn processed_key(&self) -> String {
        format!("{}_processed", self.id)
    }

    fn wait(&self, ctx: &WorkflowContext) -> NodeOutcome {
        ctx.emit(json!({
            "type": "player_turn",
            "message": self.turn_message,
            "node_id": self.id,
        }));
        let mut output = Map::new();
        output.insert("waiting_for_player".to_string(), Value::Bool(true));
        output.insert(
            "turn_message".to_string(),
            Value::String(self.turn_message.clone()),
        );
        NodeOutcome::waiting(output)
    }
}

#[async_trait]
impl WorkflowNode for PlayerTurnNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "player_turn"
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError> {
        let processed_key = self.processed_key();

        // A resume run resets the flag so the fresh message gets consumed.
        if crate::value::as_bool(
            ctx.data
                .get("processing_new_message")
                .unwrap_or(&Value::Bool(false)),
        ) {
            ctx.data.insert(processed_key.clone(), Value::Bool(false));
        }

        let loop_index = ctx
            .data
            .get("_loop")
            .filter(|l| crate::value::as_bool(l.get("is_loop_context").unwrap_or(&Value::Null)))
            .and_then(|l| l.get("index"))
            .and_then(Value::as_i64);

        // Later loop iterations start with no flag at all; that means the
        // message in the context belongs to a previous iteration.
        if loop_index.is_some_and(|i| i > 0) && !ctx.data.contains_key(&processed_key) {
            debug!(node = %self.id, index = ?loop_index, "loop iteration waits for a fresh message");
            return Ok(self.wait(ctx));
        }

        if crate::value::as_bool(ctx.data.get(&processed_key).unwrap_or(&Value::Bool(false))) {
            ctx.data.insert(processed_key, Value::Bool(false));
            ctx.data
                .insert("user_message".to_string(), Value::String(String::new()));
            return Ok(self.wait(ctx));
        }

        let user_message = ctx
            .data_str("user_message")
            .unwrap_or_default()
            .to_string();
        if user_message.is_empty() {
            return Ok(self.wait(ctx));
        }

        debug!(node = %self.id, "consuming player message");
        let result = json!({
            "player_message": user_message,
            "turn_complete": true,
        });
        ctx.data.insert(self.result_key.clone(), result.clone());
        ctx.data.insert(processed_key, Value::Bool(true));
        ctx.data
            .insert("user_message".to_string(), Value::String(String::new()));

        match result {
            Value::Object(output) => Ok(NodeOutcome::completed(output)),
            _ => Ok(NodeOutcome::completed(Map::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeStatus;
    use crate::nodes::tests::bare_services;
    use parley_core::SessionId;
    use tokio::sync::mpsc;

    fn node() -> PlayerTurnNode {
        let mut config = Map::new();
        config.insert("turn_message".into(), json!("Ask your question."));
        PlayerTurnNode::new("turn1", &config)
    }

    #[tokio::test]
    async fn waits_and_prompts_when_no_message() {
        let node = node();
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Waiting);
        assert_eq!(outcome.output["waiting_for_player"], json!(true));

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame["type"], "player_turn");
        assert_eq!(frame["message"], "Ask your question.");
    }

    #[tokio::test]
    async fn consumes_message_and_stores_result() {
        let node = node();
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data
            .insert("user_message".into(), json!("is it a boat?"));

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Completed);
        assert_eq!(outcome.output["player_message"], json!("is it a boat?"));
        assert_eq!(outcome.output["turn_complete"], json!(true));

        assert_eq!(
            ctx.data["player_turn_result"]["player_message"],
            json!("is it a boat?")
        );
        assert_eq!(ctx.data["turn1_processed"], json!(true));
        assert_eq!(ctx.data["user_message"], json!(""));
    }

    #[tokio::test]
    async fn processed_flag_forces_a_new_wait() {
        let node = node();
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data.insert("turn1_processed".into(), json!(true));
        ctx.data.insert("user_message".into(), json!("stale"));

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Waiting);
        assert_eq!(ctx.data["turn1_processed"], json!(false));
        assert_eq!(ctx.data["user_message"], json!(""));
    }

    #[tokio::test]
    async fn later_loop_iterations_wait_for_fresh_input() {
        let node = node();
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data.insert(
            "_loop".into(),
            json!({"index": 1, "is_loop_context": true}),
        );
        ctx.data.insert("user_message".into(), json!("old answer"));

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Waiting);
        // The stale message is left alone; the waiting prompt went out.
        assert_eq!(ctx.data["user_message"], json!("old answer"));
    }

    #[tokio::test]
    async fn resume_flag_clears_processed_state() {
        let node = node();
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data.insert("processing_new_message".into(), json!(true));
        ctx.data.insert("turn1_processed".into(), json!(true));
        ctx.data.insert("user_message".into(), json!("fresh guess"));

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Completed);
        assert_eq!(outcome.output["player_message"], json!("fresh guess"));
    }
}
