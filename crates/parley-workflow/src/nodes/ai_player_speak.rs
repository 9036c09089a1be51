// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Let an AI agent speak.
//!
//! Speaker selection: inside a loop with `speaker_id = "none"` the loop
//! item picks the agent (by its `identity` field); `"random"` draws one
//! of the live agents; any other value selects agents with that exact
//! identity. The rendered system templates refresh the speaker's system
//! message, the speech template becomes the user turn, and the reply is
//! broadcast as the speaker.

use async_trait::async_trait;
use parley_core::ParleyError;
use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::context::WorkflowContext;
use crate::node::{NodeOutcome, NodeServices, WorkflowNode};
use crate::template;

const CHAT_TEMPERATURE: f32 = 0.7;

pub struct AiPlayerSpeakNode {
    id: String,
    speech_template: String,
    system_message: String,
    character_setting: String,
    speaker_id: String,
    memory_roles: Vec<String>,
}

impl AiPlayerSpeakNode {
    pub fn new(id: impl Into<String>, config: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: id.into(),
            speech_template: text("speech_template"),
            system_message: text("system_message"),
            character_setting: text("character_setting"),
            speaker_id: config
                .get("speaker_id")
                .and_then(Value::as_str)
                .unwrap_or("random")
                .to_string(),
            memory_roles: config
                .get("memory_roles")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn select_speakers(&self, ctx: &WorkflowContext) -> Vec<usize> {
        if self.speaker_id == "none" {
            // Inside a loop the iteration item names the speaker.
            let loop_identity = ctx
                .data
                .get("_loop")
                .filter(|l| crate::value::as_bool(l.get("is_loop_context").unwrap_or(&Value::Null)))
                .and_then(|l| l.get("item"))
                .and_then(|item| match item {
                    Value::String(identity) => Some(identity.clone()),
                    other => other
                        .get("identity")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            if let Some(identity) = loop_identity {
                if let Some(index) = ctx.agent_index(&identity) {
                    return vec![index];
                }
                warn!(node = %self.id, identity = %identity, "loop item names no live agent");
            }
            return Vec::new();
        }

        if self.speaker_id == "random" {
            if ctx.agents.is_empty() {
                return Vec::new();
            }
            return vec![rand::thread_rng().gen_range(0..ctx.agents.len())];
        }

        ctx.agents
            .iter()
            .enumerate()
            .filter(|(_, agent)| agent.identity == self.speaker_id)
            .map(|(index, _)| index)
            .collect()
    }
}

#[async_trait]
impl WorkflowNode for AiPlayerSpeakNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "ai_player_speak"
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError> {
        if ctx.agents.is_empty() {
            return Err(ParleyError::Workflow(format!(
                "ai_player_speak node '{}' has no agents to speak",
                self.id
            )));
        }

        let speakers = self.select_speakers(ctx);
        if speakers.is_empty() {
            // A "none" speaker with no matching agent is a quiet no-op,
            // mirroring optional narration slots in templates.
            if self.speaker_id == "none" {
                let mut output = Map::new();
                output.insert("message".to_string(), Value::String(String::new()));
                output.insert("memory_roles".to_string(), json!([]));
                return Ok(NodeOutcome::completed(output));
            }
            return Err(ParleyError::Workflow(format!(
                "ai_player_speak node '{}' found no speaker for '{}'",
                self.id, self.speaker_id
            )));
        }

        let inputs = ctx.current_node_inputs.clone();
        let speech = template::render(&self.speech_template, &inputs);
        let system = format!(
            "{} {}",
            template::render(&self.system_message, &inputs),
            template::render(&self.character_setting, &inputs)
        )
        .trim()
        .to_string();

        let mut spoken = Vec::new();
        let mut speaker_identities = Vec::new();
        let mut frames = Vec::new();
        for &index in &speakers {
            let agent = &mut ctx.agents[index];
            if !system.is_empty() {
                agent.set_system(system.clone());
            }
            if !speech.is_empty() {
                agent.add_memory("user", speech.clone());
            }
            let response = agent.chat(CHAT_TEMPERATURE).await?;
            debug!(node = %self.id, speaker = %agent.name(), "agent spoke");
            frames.push(json!({
                "type": "message",
                "role": agent.identity,
                "name": agent.name(),
                "content": response.content,
                "node_id": self.id,
            }));
            speaker_identities.push(agent.identity.clone());
            spoken.push(response.content);
        }
        for frame in frames {
            ctx.emit(frame);
        }

        // The last reply lands in the memories of the configured roles.
        let mut updated_roles = Vec::new();
        if let Some(last) = spoken.last().cloned() {
            if !self.memory_roles.is_empty() {
                let share_all = self.memory_roles.iter().any(|r| r == "ALL");
                for agent in &mut ctx.agents {
                    if speaker_identities.contains(&agent.identity) {
                        continue;
                    }
                    if share_all || self.memory_roles.contains(&agent.identity) {
                        agent.add_memory("user", last.clone());
                        updated_roles.push(agent.identity.clone());
                    }
                }
            }
        }

        let mut output = Map::new();
        output.insert("message".to_string(), Value::String(spoken.join("\n")));
        output.insert(
            "memory_roles".to_string(),
            Value::Array(updated_roles.into_iter().map(Value::String).collect()),
        );
        Ok(NodeOutcome::completed(output))
    }
}
