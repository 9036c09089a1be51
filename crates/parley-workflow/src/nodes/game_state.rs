// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry node: validates the initial game state and builds the player
//! agents for the whole flow.

use async_trait::async_trait;
use parley_core::ParleyError;
use parley_game::GameAgent;
use rand::seq::SliceRandom;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::context::WorkflowContext;
use crate::node::{NodeOutcome, NodeServices, WorkflowNode};

const REQUIRED_STATE_FIELDS: [&str; 4] = ["game_type", "status", "min_players", "max_players"];

/// Seeds `state` in the context from the configured `initial_state`,
/// checks `character_list` against the player bounds, and creates one
/// agent per character. Special identities from the `characters` config
/// list are shuffled over the players; everyone else is a plain
/// `player`.
///
/// Must be the entry node: it refuses to run when agents already exist.
pub struct GameStateNode {
    id: String,
    initial_state: Map<String, Value>,
    special_identities: Vec<String>,
}

impl GameStateNode {
    pub fn new(id: impl Into<String>, config: &Map<String, Value>) -> Self {
        let initial_state = match config.get("initial_state") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let special_identities = config
            .get("characters")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: id.into(),
            initial_state,
            special_identities,
        }
    }
}

/// One entry of `character_list`: a bare role id or an object naming the
/// role and optionally overriding the model.
fn parse_character(entry: &Value) -> Option<(String, Option<String>)> {
    match entry {
        Value::String(role_id) => Some((role_id.clone(), None)),
        Value::Object(map) => {
            let role_id = map.get("role_id").and_then(Value::as_str)?;
            let model_id = map
                .get("model_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some((role_id.to_string(), model_id))
        }
        _ => None,
    }
}

#[async_trait]
impl WorkflowNode for GameStateNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "game_state"
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError> {
        if !ctx.agents.is_empty() {
            return Err(ParleyError::Workflow(format!(
                "game_state node '{}' must be the entry node",
                self.id
            )));
        }
        for field in REQUIRED_STATE_FIELDS {
            if !self.initial_state.contains_key(field) {
                return Err(ParleyError::Workflow(format!(
                    "game_state node '{}' initial_state missing '{field}'",
                    self.id
                )));
            }
        }

        let characters: Vec<(String, Option<String>)> = ctx
            .data
            .get("character_list")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_character).collect())
            .unwrap_or_default();

        let min = self.initial_state["min_players"].as_u64().unwrap_or(1) as usize;
        let max = self.initial_state["max_players"].as_u64().unwrap_or(usize::MAX as u64) as usize;
        if characters.len() < min || characters.len() > max {
            return Err(ParleyError::Workflow(format!(
                "character_list has {} entries, needs between {min} and {max}",
                characters.len()
            )));
        }

        let mut identities = self.special_identities.clone();
        identities.shuffle(&mut rand::thread_rng());

        let mut players = Vec::with_capacity(characters.len());
        for (index, (role_id, model_override)) in characters.iter().enumerate() {
            let role = services
                .catalog
                .roles
                .get(role_id)
                .await?
                .ok_or_else(|| {
                    ParleyError::Workflow(format!("unknown role in character_list: {role_id}"))
                })?;
            let model_id = model_override
                .clone()
                .or_else(|| role.model_id.clone())
                .unwrap_or_else(|| services.default_model_id.clone());
            let identity = identities
                .get(index)
                .cloned()
                .unwrap_or_else(|| "player".to_string());
            let provider = services
                .adapters
                .provider_for_model(&model_id)
                .await?
                .for_session(ctx.session_id.as_str());

            let agent = GameAgent::new(identity, role, model_id, provider);
            debug!(agent = %agent.agent_id, identity = %agent.identity, "built workflow agent");
            players.push(json!({
                "agent_id": agent.agent_id,
                "identity": agent.identity,
                "name": agent.name(),
                "role_id": agent.role.role_id,
                "model_id": agent.model_id,
            }));
            ctx.agents.push(agent);
        }

        let mut state = self.initial_state.clone();
        state.insert("status".to_string(), Value::String("initialized".into()));
        state.insert("round".to_string(), json!(0));
        state.insert("players".to_string(), Value::Array(players.clone()));

        // The state fields also land at the root, where templates and
        // conditions expect them.
        for (key, value) in &state {
            ctx.data.insert(key.clone(), value.clone());
        }
        ctx.data
            .insert("state".to_string(), Value::Object(state.clone()));
        ctx.data
            .insert("players".to_string(), Value::Array(players.clone()));

        info!(
            node = %self.id,
            players = players.len(),
            game_type = %state.get("game_type").and_then(serde_json::Value::as_str).unwrap_or(""),
            "game state initialized"
        );

        let mut output = Map::new();
        output.insert("state".to_string(), Value::Object(state));
        output.insert("players".to_string(), Value::Array(players));
        Ok(NodeOutcome::completed(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeStatus;
    use crate::nodes::tests::seeded_services;
    use parley_core::SessionId;
    use serde_json::json;

    fn config() -> Map<String, Value> {
        match json!({
            "initial_state": {
                "game_type": "who_is_spy",
                "status": "pending",
                "min_players": 2,
                "max_players": 4
            },
            "characters": ["spy"]
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn builds_agents_and_seeds_state() {
        let services = seeded_services().await;
        let node = GameStateNode::new("setup", &config());
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data
            .insert("character_list".into(), json!(["npc", "npc", "npc"]));

        let outcome = node.run(&mut ctx, &services).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Completed);
        assert_eq!(ctx.agents.len(), 3);

        // Exactly one agent carries the special identity.
        let spies = ctx.agents.iter().filter(|a| a.identity == "spy").count();
        assert_eq!(spies, 1);
        assert!(ctx.agents.iter().any(|a| a.identity == "player"));

        assert_eq!(ctx.data["state"]["status"], json!("initialized"));
        assert_eq!(ctx.data["state"]["round"], json!(0));
        assert_eq!(ctx.data["status"], json!("initialized"));
        assert_eq!(
            ctx.data["players"].as_array().map(Vec::len),
            Some(3)
        );
    }

    #[tokio::test]
    async fn rejects_player_count_out_of_bounds() {
        let services = seeded_services().await;
        let node = GameStateNode::new("setup", &config());
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data.insert("character_list".into(), json!(["npc"]));

        let err = node.run(&mut ctx, &services).await.unwrap_err();
        assert!(matches!(err, ParleyError::Workflow(_)));
    }

    #[tokio::test]
    async fn rejects_incomplete_initial_state() {
        let services = seeded_services().await;
        let mut config = Map::new();
        config.insert("initial_state".into(), json!({"game_type": "g"}));
        let node = GameStateNode::new("setup", &config);
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data
            .insert("character_list".into(), json!(["npc", "npc"]));

        let err = node.run(&mut ctx, &services).await.unwrap_err();
        assert!(matches!(err, ParleyError::Workflow(_)));
    }

    #[tokio::test]
    async fn unknown_role_is_an_error() {
        let services = seeded_services().await;
        let node = GameStateNode::new("setup", &config());
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data
            .insert("character_list".into(), json!(["npc", "ghost"]));

        let err = node.run(&mut ctx, &services).await.unwrap_err();
        assert!(matches!(err, ParleyError::Workflow(_)));
    }
}
