// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A live game agent: one role, one model, one conversation memory.

use parley_core::chat::{ChatMessage, ChatRequest, ChatResponse, ToolSpec};
use parley_core::records::RoleRecord;
use parley_core::traits::ChatProvider;
use parley_core::ParleyError;
use parley_llm::AccountedProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-safe projection of an agent, stored inside the session blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    /// Game-level part, e.g. "setter" or "player".
    pub identity: String,
    pub role: RoleRecord,
    pub model_id: String,
    pub memory: Vec<StoredMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
}

/// A role-playing agent bound to an accounted provider.
pub struct GameAgent {
    pub agent_id: String,
    pub identity: String,
    pub role: RoleRecord,
    pub model_id: String,
    pub memory: Vec<ChatMessage>,
    provider: AccountedProvider,
}

impl GameAgent {
    pub fn new(
        identity: impl Into<String>,
        role: RoleRecord,
        model_id: impl Into<String>,
        provider: AccountedProvider,
    ) -> Self {
        Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            identity: identity.into(),
            role,
            model_id: model_id.into(),
            memory: Vec::new(),
            provider,
        }
    }

    /// Display name used when tagging transcript lines.
    pub fn name(&self) -> &str {
        &self.role.name
    }

    /// Installs or replaces the system message at the head of memory.
    pub fn set_system(&mut self, content: impl Into<String>) {
        match self.memory.first_mut() {
            Some(first) if first.role == "system" => first.content = content.into(),
            _ => self.memory.insert(0, ChatMessage::system(content)),
        }
    }

    pub fn add_memory(&mut self, role: &str, content: impl Into<String>) {
        self.memory.push(ChatMessage::plain(role, content));
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.memory.push(message);
    }

    /// One chat turn from current memory; the reply is appended to memory.
    pub async fn chat(&mut self, temperature: f32) -> Result<ChatResponse, ParleyError> {
        let request =
            ChatRequest::new(self.memory.clone()).with_temperature(temperature);
        let response = self.provider.chat(request).await?;
        self.memory
            .push(ChatMessage::assistant(response.content.clone()));
        Ok(response)
    }

    /// A function-call turn from current memory; memory is not mutated,
    /// callers decide what to keep.
    pub async fn function_call(
        &self,
        tools: &[ToolSpec],
        temperature: f32,
    ) -> Result<ChatResponse, ParleyError> {
        self.function_call_messages(self.memory.clone(), tools, temperature)
            .await
    }

    /// A function-call turn over an explicit message list.
    pub async fn function_call_messages(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolSpec],
        temperature: f32,
    ) -> Result<ChatResponse, ParleyError> {
        let request = ChatRequest::new(messages).with_temperature(temperature);
        self.provider.function_call(request, tools).await
    }

    /// A chat turn over an explicit message list, leaving memory alone.
    pub async fn chat_messages(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<ChatResponse, ParleyError> {
        let request = ChatRequest::new(messages).with_temperature(temperature);
        self.provider.chat(request).await
    }

    /// JSON-safe snapshot for session persistence.
    pub fn snapshot(&self) -> AgentState {
        AgentState {
            agent_id: self.agent_id.clone(),
            identity: self.identity.clone(),
            role: self.role.clone(),
            model_id: self.model_id.clone(),
            memory: self
                .memory
                .iter()
                .map(|m| StoredMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
        }
    }

    /// Rebuilds a live agent from a snapshot and a fresh provider handle.
    pub fn restore(state: AgentState, provider: AccountedProvider) -> Self {
        Self {
            agent_id: state.agent_id,
            identity: state.identity,
            role: state.role,
            model_id: state.model_id,
            memory: state
                .memory
                .into_iter()
                .map(|m| ChatMessage::plain(m.role, m.content))
                .collect(),
            provider,
        }
    }
}

/// Serializes a set of agents into the snapshot value stored in sessions.
pub fn snapshot_agents(agents: &[GameAgent]) -> Result<Value, ParleyError> {
    let states: Vec<AgentState> = agents.iter().map(GameAgent::snapshot).collect();
    Ok(serde_json::to_value(states)?)
}

/// Decodes the snapshot value back into agent states.
pub fn decode_agents(agents_data: &Value) -> Result<Vec<AgentState>, ParleyError> {
    Ok(serde_json::from_value(agents_data.clone())?)
}
