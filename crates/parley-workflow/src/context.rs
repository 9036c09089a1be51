// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The mutable state a workflow session carries between nodes, and its
//! JSON-safe snapshot for persistence.

use parley_core::{ParleyError, SessionId};
use parley_game::{decode_agents, snapshot_agents, GameAgent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    /// Suspended at a node that needs external input.
    Waiting,
    Completed,
    Failed,
}

/// Per-session workflow state.
///
/// `data` is the shared blackboard nodes read and write; `node_results`
/// keeps each executed node's output keyed by node id;
/// `current_node_inputs` is rebuilt by the engine before every node.
/// Live agents ride alongside as they cannot live in JSON; they are
/// snapshotted separately for persistence.
pub struct WorkflowContext {
    pub session_id: SessionId,
    pub data: Map<String, Value>,
    pub node_results: Map<String, Value>,
    pub current_node_inputs: Map<String, Value>,
    pub current_node_id: Option<String>,
    pub status: WorkflowStatus,
    pub agents: Vec<GameAgent>,
    events: Option<mpsc::UnboundedSender<Value>>,
}

impl WorkflowContext {
    pub fn new(session_id: SessionId) -> Self {
        let mut data = Map::new();
        data.insert(
            "session_id".to_string(),
            Value::String(session_id.as_str().to_string()),
        );
        Self {
            session_id,
            data,
            node_results: Map::new(),
            current_node_inputs: Map::new(),
            current_node_id: None,
            status: WorkflowStatus::Running,
            agents: Vec::new(),
            events: None,
        }
    }

    /// Attaches the client event channel. Replaces any previous one, so
    /// a reconnecting client starts receiving events again.
    pub fn attach_events(&mut self, sender: mpsc::UnboundedSender<Value>) {
        self.events = Some(sender);
    }

    /// Sends an event frame to the connected client. A missing or closed
    /// channel is not an error; the session keeps running.
    pub fn emit(&self, frame: Value) {
        if let Some(events) = &self.events {
            if events.send(frame).is_err() {
                debug!(session = %self.session_id.as_str(), "event channel closed, dropping frame");
            }
        }
    }

    /// Merges a JSON object into `data`, overwriting existing keys.
    pub fn merge_data(&mut self, incoming: Map<String, Value>) {
        for (key, value) in incoming {
            self.data.insert(key, value);
        }
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Finds a live agent by its game identity.
    pub fn agent_index(&self, identity: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.identity == identity)
    }

    /// Serializes the persistent parts of the context.
    pub fn snapshot(&self) -> Result<ContextSnapshot, ParleyError> {
        Ok(ContextSnapshot {
            data: self.data.clone(),
            node_results: self.node_results.clone(),
            current_node_id: self.current_node_id.clone(),
            status: self.status,
            agents: snapshot_agents(&self.agents)?,
        })
    }
}

/// JSON-safe projection of a context, stored in the session blob. Agents
/// are rebuilt against live providers on restore, so the snapshot keeps
/// only their serialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub data: Map<String, Value>,
    pub node_results: Map<String, Value>,
    pub current_node_id: Option<String>,
    pub status: WorkflowStatus,
    pub agents: Value,
}

impl ContextSnapshot {
    /// Rebuilds a context; `agents` must already be re-bound to
    /// providers by the caller (see `WorkflowService::restore_agents`).
    pub fn into_context(
        self,
        session_id: SessionId,
        agents: Vec<GameAgent>,
    ) -> WorkflowContext {
        WorkflowContext {
            session_id,
            data: self.data,
            node_results: self.node_results,
            current_node_inputs: Map::new(),
            current_node_id: self.current_node_id,
            status: self.status,
            agents,
            events: None,
        }
    }

    /// Decodes the stored agent states for re-binding.
    pub fn agent_states(&self) -> Result<Vec<parley_game::AgentState>, ParleyError> {
        decode_agents(&self.agents)
    }
}
