// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persisted session blob.
//!
//! One [`GameSession`] holds everything a game needs to resume after a
//! reconnect or a process restart: the transcript, game-specific state,
//! usage totals, and JSON-safe snapshots of the agents.

use parley_core::{GameMessage, SessionId, TurnState};
use parley_usage::UsageContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-safe snapshot of a game's agents.
///
/// Agents hold provider handles that cannot serialize; runtimes dump the
/// serializable parts (memories, role assignments) into `agents_data` and
/// rebuild live agents from it on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agents_data: Value,
    /// Snapshot encoding marker, currently always "json_safe".
    pub format: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

impl AgentSnapshot {
    pub fn new(agents_data: Value) -> Self {
        Self {
            agents_data,
            format: "json_safe".to_string(),
            timestamp: now_ms(),
        }
    }
}

/// A persisted multi-player game session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: String,
    pub game_type: String,
    pub status: TurnState,
    #[serde(default)]
    pub current_round: u32,
    /// Full message transcript, replayed to reconnecting clients.
    #[serde(default)]
    pub game_record: Vec<GameMessage>,
    /// Game-specific state bag (puzzle text, solution, turn order).
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub serialized_agents: Option<AgentSnapshot>,
    #[serde(default)]
    pub usage: UsageContext,
    /// Opaque client-supplied data echoed back on reconnect.
    #[serde(default)]
    pub user_data: Option<Value>,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
    /// Unix timestamp in milliseconds, bumped on every save.
    pub updated_at: i64,
}

impl GameSession {
    pub fn new(session_id: &SessionId, game_type: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            session_id: session_id.as_str().to_string(),
            game_type: game_type.into(),
            status: TurnState::WaitingForHuman,
            current_round: 0,
            game_record: Vec::new(),
            state: Map::new(),
            serialized_agents: None,
            usage: UsageContext::new(),
            user_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a message to the transcript.
    pub fn push_message(&mut self, message: GameMessage) {
        self.game_record.push(message);
    }

    /// Reads a state value, if present.
    pub fn state_value(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Writes a state value.
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    /// Milliseconds since the last save.
    pub fn idle_ms(&self, now: i64) -> i64 {
        now - self.updated_at
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_waiting() {
        let session = GameSession::new(&SessionId("s1".into()), "turtle_soup");
        assert_eq!(session.status, TurnState::WaitingForHuman);
        assert_eq!(session.current_round, 0);
        assert!(session.game_record.is_empty());
        assert_eq!(session.created_at, session.updated_at);
    }

    #[test]
    fn snapshot_is_marked_json_safe() {
        let snapshot = AgentSnapshot::new(serde_json::json!({"host": {"memory": []}}));
        assert_eq!(snapshot.format, "json_safe");
        assert!(snapshot.timestamp > 0);
    }

    #[test]
    fn blob_round_trips_with_missing_optional_fields() {
        let raw = serde_json::json!({
            "session_id": "s2",
            "game_type": "turtle_soup",
            "status": "ai_turn",
            "created_at": 1000,
            "updated_at": 2000
        });
        let session: GameSession = serde_json::from_value(raw).unwrap();
        assert_eq!(session.status, TurnState::AiTurn);
        assert!(session.serialized_agents.is_none());
        assert_eq!(session.idle_ms(5000), 3000);
    }
}
