// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Parley game server.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a game or workflow session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an in-game agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by backend health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is fully operational.
    Healthy,
    /// Backend is operational but experiencing issues.
    Degraded(String),
    /// Backend is not operational.
    Unhealthy(String),
}

/// High-level status of a game turn, sent to clients as the `status` field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    /// The round is waiting on human input.
    WaitingForHuman,
    /// AI players are taking their turns.
    AiTurn,
    /// The game has concluded.
    GameOver,
    /// The turn failed.
    Error,
}

/// Outcome of a game operation, serialized to the client as a status frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub status: TurnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_round: Option<u32>,
    /// Game-specific extras (e.g. puzzle reveal fields at game over).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TurnOutcome {
    pub fn new(status: TurnState) -> Self {
        TurnOutcome {
            status,
            message: None,
            current_round: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.current_round = Some(round);
        self
    }
}

/// Token usage attached to a broadcast game message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
}

/// A message in a session's game record, broadcast to every attached client.
///
/// Field names follow the wire protocol (camelCase) that existing clients
/// already speak.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMessage {
    pub msg_id: String,
    pub role: String,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<MessageUsage>,
}

impl GameMessage {
    /// Builds a message with a fresh id and the current timestamp.
    pub fn new(
        session_id: &SessionId,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        GameMessage {
            msg_id: uuid::Uuid::new_v4().to_string(),
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            session_id: session_id.0.clone(),
            agent_id: None,
            role_info: None,
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_state_wire_names_are_snake_case() {
        let json = serde_json::to_string(&TurnState::WaitingForHuman).unwrap();
        assert_eq!(json, "\"waiting_for_human\"");
        assert_eq!(TurnState::GameOver.to_string(), "game_over");
    }

    #[test]
    fn game_message_uses_camel_case_wire_fields() {
        let sid = SessionId("s-1".into());
        let msg = GameMessage::new(&sid, "player", "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("msgId").is_some());
        assert_eq!(json["sessionId"], "s-1");
        assert!(json.get("agent_id").is_none());
    }

    #[test]
    fn turn_outcome_flattens_extras() {
        let mut outcome = TurnOutcome::new(TurnState::GameOver).with_message("done");
        outcome
            .extra
            .insert("soup_surface".into(), serde_json::json!("a riddle"));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "game_over");
        assert_eq!(json["soup_surface"], "a riddle");
        assert!(json.get("current_round").is_none());
    }
}
