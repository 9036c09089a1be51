// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoint for runtime-driven games.
//!
//! Client -> Server (JSON):
//! ```json
//! {"session_id": "abc", "user_data": {...}, "roles": ["r1"]}
//! {"type": "human_message", "message": "Is it about the sea?"}
//! {"type": "end_game"}
//! ```
//!
//! Server -> Client (JSON): GameMessage objects plus status frames
//! `{"status": "waiting_for_human" | "ai_turn" | "game_over" | "error", ...}`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_core::{SessionId, TurnOutcome};
use parley_game::{play_game, ClientCommand, GameContext};

use crate::server::GatewayState;

/// First frame on a game connection.
#[derive(Debug, Deserialize)]
struct GameInit {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    player_count: Option<usize>,
    #[serde(default, alias = "user_info")]
    user_data: Option<Value>,
    #[serde(default)]
    roles: Option<Value>,
}

/// Control frames after initialization.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GameClientFrame {
    HumanMessage { message: String },
    EndGame,
}

fn error_frame(message: &str) -> String {
    json!({"error": message, "status": "error"}).to_string()
}

/// WebSocket upgrade handler for `/ws/game/{game_type}`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(game_type): Path<String>,
    State(state): State<GatewayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, game_type, state))
}

async fn send_text(
    sender: &mut SplitSink<WebSocket, Message>,
    text: String,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(text.into())).await
}

/// Reads the next text frame, skipping pings; `None` means the client left.
async fn next_text(receiver: &mut futures::stream::SplitStream<WebSocket>) -> Option<String> {
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => return Some(text.to_string()),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn handle_socket(socket: WebSocket, game_type: String, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // First frame carries the session id and optional custom setup.
    let Some(text) = next_text(&mut ws_receiver).await else {
        return;
    };
    let init: GameInit = match serde_json::from_str(&text) {
        Ok(init) => init,
        Err(e) => {
            warn!(%game_type, error = %e, "invalid game init frame");
            let _ = send_text(&mut ws_sender, error_frame("invalid initialization frame")).await;
            return;
        }
    };
    let Some(session_id) = init.session_id.filter(|id| !id.is_empty()) else {
        let _ = send_text(&mut ws_sender, error_frame("missing session_id")).await;
        return;
    };
    let session_id = SessionId(session_id);

    info!(%game_type, session_id = %session_id, "game connection initialized");

    let ctx = GameContext {
        session_id: session_id.clone(),
        sessions: state.sessions.clone(),
        hub: state.hub.clone(),
        catalog: state.catalog.clone(),
        adapters: state.adapters.clone(),
        settings: state.settings.clone(),
    };
    let mut runtime = match state.factory.create(&game_type, ctx) {
        Ok(runtime) => runtime,
        Err(error) => {
            let _ = send_text(&mut ws_sender, error_frame(&error.to_string())).await;
            return;
        }
    };

    // Re-attach to a persisted session before deciding how to drive.
    let resumed = match runtime.attach().await {
        Ok(resumed) => resumed,
        Err(error) => {
            warn!(session_id = %session_id, %error, "session attach failed");
            let _ = send_text(&mut ws_sender, error_frame(&error.to_string())).await;
            return;
        }
    };

    // The stored transcript replays into this connection on register.
    let transcript = match state.sessions.load(&game_type, &session_id).await {
        Ok(Some(session)) => session.game_record,
        Ok(None) => Vec::new(),
        Err(error) => {
            warn!(session_id = %session_id, %error, "transcript load failed, replaying nothing");
            Vec::new()
        }
    };
    let (ws_id, mut hub_rx) = match state
        .hub
        .register(&game_type, &session_id, &transcript)
        .await
    {
        Ok(registered) => registered,
        Err(error) => {
            let _ = send_text(&mut ws_sender, error_frame(&error.to_string())).await;
            return;
        }
    };

    // All outbound traffic funnels through one channel so frames stay ordered.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let sender_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if send_text(&mut ws_sender, text).await.is_err() {
                break;
            }
        }
    });

    let hub_out = out_tx.clone();
    let hub_task = tokio::spawn(async move {
        while let Some(message) = hub_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if hub_out.send(text).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "game message did not serialize"),
            }
        }
    });

    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<TurnOutcome>();
    let status_out = out_tx.clone();
    let status_task = tokio::spawn(async move {
        while let Some(outcome) = status_rx.recv().await {
            match serde_json::to_string(&outcome) {
                Ok(text) => {
                    if status_out.send(text).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "status frame did not serialize"),
            }
        }
    });

    let custom_params = custom_params(init.player_count, init.user_data, init.roles);
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(16);
    let driver_out = out_tx.clone();
    let driver_session = session_id.clone();
    let driver_task = tokio::spawn(async move {
        if let Err(error) =
            play_game(runtime.as_mut(), resumed, custom_params, &mut cmd_rx, &status_tx).await
        {
            warn!(session_id = %driver_session, %error, "game driver failed");
            let _ = driver_out.send(error_frame(&error.to_string()));
        }
    });

    // Receive loop: control frames feed the driver until either side leaves.
    while let Some(text) = next_text(&mut ws_receiver).await {
        let frame: GameClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "unrecognized game frame");
                let _ = out_tx.send(error_frame("unrecognized message"));
                continue;
            }
        };
        let command = match frame {
            GameClientFrame::HumanMessage { message } => ClientCommand::HumanMessage(message),
            GameClientFrame::EndGame => ClientCommand::EndGame,
        };
        if cmd_tx.send(command).await.is_err() {
            // Driver finished; the game is over or suspended.
            break;
        }
    }

    debug!(session_id = %session_id, ws_id = %ws_id, "game connection closing");
    drop(cmd_tx);
    let _ = driver_task.await;
    if let Err(error) = state.hub.unregister(&game_type, &session_id, &ws_id).await {
        warn!(session_id = %session_id, %error, "hub unregister failed");
    }
    drop(out_tx);
    hub_task.abort();
    status_task.abort();
    let _ = sender_task.await;
}

/// Folds the optional init extras into the runtime's custom params.
///
/// Key names match what the game runtimes deserialize: the wire field
/// `user_data` lands as `user_info`.
fn custom_params(
    player_count: Option<usize>,
    user_data: Option<Value>,
    roles: Option<Value>,
) -> Option<Value> {
    let mut params = serde_json::Map::new();
    if let Some(count) = player_count {
        params.insert("player_count".to_string(), json!(count));
    }
    if let Some(user_data) = user_data {
        params.insert("user_info".to_string(), user_data);
    }
    if let Some(roles) = roles {
        params.insert("roles".to_string(), roles);
    }
    if params.is_empty() {
        None
    } else {
        Some(Value::Object(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_frame_deserializes_minimal() {
        let init: GameInit = serde_json::from_str(r#"{"session_id": "s-1"}"#).unwrap();
        assert_eq!(init.session_id.as_deref(), Some("s-1"));
        assert!(init.user_data.is_none());
    }

    #[test]
    fn init_frame_tolerates_missing_session() {
        let init: GameInit = serde_json::from_str(r#"{"user_data": {"name": "mo"}}"#).unwrap();
        assert!(init.session_id.is_none());
    }

    #[test]
    fn control_frames_deserialize() {
        let frame: GameClientFrame =
            serde_json::from_str(r#"{"type": "human_message", "message": "hi"}"#).unwrap();
        assert!(matches!(frame, GameClientFrame::HumanMessage { .. }));

        let frame: GameClientFrame = serde_json::from_str(r#"{"type": "end_game"}"#).unwrap();
        assert!(matches!(frame, GameClientFrame::EndGame));
    }

    #[test]
    fn error_frame_carries_status() {
        let frame: Value = serde_json::from_str(&error_frame("boom")).unwrap();
        assert_eq!(frame["status"], "error");
        assert_eq!(frame["error"], "boom");
    }

    #[test]
    fn custom_params_fold() {
        assert!(custom_params(None, None, None).is_none());
        let params = custom_params(Some(2), Some(json!({"lang": "en"})), None).unwrap();
        assert_eq!(params["player_count"], 2);
        assert_eq!(params["user_info"]["lang"], "en");
    }

    #[test]
    fn init_frame_carries_player_count_and_user_data() {
        let init: GameInit = serde_json::from_str(
            r#"{"session_id": "s-1", "player_count": 4, "user_data": {"name": "mo"}}"#,
        )
        .unwrap();
        assert_eq!(init.player_count, Some(4));
        assert_eq!(init.user_data.as_ref().unwrap()["name"], "mo");

        // Clients sending the runtime's own field name are accepted too.
        let init: GameInit =
            serde_json::from_str(r#"{"session_id": "s-1", "user_info": {"k": 1}}"#).unwrap();
        assert!(init.user_data.is_some());
    }
}
