// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoint for template-driven workflow sessions.
//!
//! Connection handshake:
//! 1. Server accepts and sends `{"type": "connection", "status": "accepted"}`.
//! 2. Client sends an init frame `{workflow_id?, session_id?, player_count?,
//!    user_data?, roles?}`. An unknown session id with no workflow id is an
//!    error; a known session id reconnects.
//! 3. Server answers `session_created` or `session_connected` and starts
//!    (or waits on) the workflow. Node events stream as JSON frames.
//!
//! Afterwards every client frame carrying `content` or `message` resumes
//! the suspended workflow with that text as the user message.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_core::{ParleyError, SessionId};
use parley_workflow::{WorkflowOutcome, WorkflowStatus};

use crate::server::GatewayState;

/// Init frame on a workflow connection.
#[derive(Debug, Deserialize)]
struct WorkflowInit {
    #[serde(default)]
    session_id: Option<String>,
    /// Workflow to start; `game_type` is the legacy client key for it.
    #[serde(default, alias = "game_type")]
    workflow_id: Option<String>,
    #[serde(default)]
    player_count: Option<usize>,
    #[serde(default)]
    user_data: Option<Value>,
    #[serde(default)]
    roles: Option<Value>,
}

/// WebSocket upgrade handler for `/ws/workflow`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn event_frame(kind: &str, session_id: Option<&str>, message: &str) -> Value {
    let mut frame = json!({
        "type": kind,
        "message": message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Some(session_id) = session_id {
        frame["session_id"] = Value::String(session_id.to_string());
    }
    frame
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &Value,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(frame.to_string().into())).await
}

async fn next_text(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => return Some(text.to_string()),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Extracts the user text from a client frame; plain text frames count too.
fn user_message(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(data) => data
            .get("content")
            .or_else(|| data.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let accepted = json!({
        "type": "connection",
        "status": "accepted",
        "message": "connection accepted, waiting for initialization",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if send_json(&mut ws_sender, &accepted).await.is_err() {
        return;
    }

    let Some(text) = next_text(&mut ws_receiver).await else {
        return;
    };
    let init: WorkflowInit = match serde_json::from_str(&text) {
        Ok(init) => init,
        Err(e) => {
            warn!(error = %e, "invalid workflow init frame");
            let frame = event_frame("workflow_error", None, "invalid initialization frame");
            let _ = send_json(&mut ws_sender, &frame).await;
            return;
        }
    };

    // Node events stream through this channel into the socket.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Value>();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if send_json(&mut ws_sender, &frame).await.is_err() {
                break;
            }
        }
    });
    let events_out = out_tx.clone();
    let session_hint = init.session_id.clone().unwrap_or_default();
    let events_task = tokio::spawn(async move {
        while let Some(mut frame) = events_rx.recv().await {
            if let Some(object) = frame.as_object_mut() {
                object
                    .entry("timestamp")
                    .or_insert_with(|| json!(chrono::Utc::now().to_rfc3339()));
                object
                    .entry("session_id")
                    .or_insert_with(|| json!(session_hint.clone()));
            }
            if events_out.send(frame).is_err() {
                break;
            }
        }
    });

    let session_id = match establish(&state, init, events_tx, &out_tx).await {
        Ok(session_id) => session_id,
        Err(error) => {
            warn!(%error, "workflow session setup failed");
            let frame = event_frame("workflow_error", None, &error.to_string());
            let _ = out_tx.send(frame);
            drop(out_tx);
            events_task.abort();
            let _ = sender_task.await;
            return;
        }
    };

    // Message loop: every client frame resumes the suspended workflow.
    while let Some(text) = next_text(&mut ws_receiver).await {
        let message = user_message(&text);
        debug!(session_id = %session_id, "workflow message received");

        let mut ack = event_frame(
            "message_processing",
            Some(session_id.as_str()),
            "your message is being processed",
        );
        ack["content"] = Value::String(message.clone());
        let _ = out_tx.send(ack);

        let mut resume_data = Map::new();
        resume_data.insert("user_message".to_string(), Value::String(message));
        match state.workflows.resume(&session_id, resume_data).await {
            Ok(outcome) => report_outcome(&out_tx, &session_id, &outcome),
            Err(error) => {
                warn!(session_id = %session_id, %error, "workflow resume failed");
                let frame = event_frame(
                    "workflow_error",
                    Some(session_id.as_str()),
                    &error.to_string(),
                );
                let _ = out_tx.send(frame);
            }
        }
    }

    info!(session_id = %session_id, "workflow connection closed");
    state.workflows.detach(&session_id);
    drop(out_tx);
    events_task.abort();
    let _ = sender_task.await;
}

/// Creates or reconnects the session, announces it, and runs the first leg.
async fn establish(
    state: &GatewayState,
    init: WorkflowInit,
    events_tx: mpsc::UnboundedSender<Value>,
    out_tx: &mpsc::UnboundedSender<Value>,
) -> Result<SessionId, ParleyError> {
    if let Some(id) = init.session_id.as_ref().filter(|id| !id.is_empty()) {
        let session_id = SessionId(id.clone());
        if state.workflows.session_exists(&session_id).await? {
            state.workflows.connect(&session_id, events_tx).await?;
            let frame = event_frame(
                "session_connected",
                Some(session_id.as_str()),
                "connected to an existing session",
            );
            let _ = out_tx.send(frame);
            let _ = out_tx.send(event_frame(
                "client_connected",
                Some(session_id.as_str()),
                "new client connected",
            ));
            return Ok(session_id);
        }
    }

    let workflow_id = init
        .workflow_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ParleyError::Workflow("missing workflow_id".into()))?;
    let session_id = SessionId(
        init.session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    );

    let mut data = Map::new();
    data.insert("game_type".to_string(), json!(workflow_id));
    if let Some(user_data) = init.user_data {
        data.insert("user_data".to_string(), user_data);
    }
    if let Some(roles) = init.roles {
        data.insert("roles".to_string(), roles);
    }
    let player_count = init.player_count.unwrap_or(1);
    let character_list = state.catalog.roles.random_roles(player_count).await?;
    data.insert("character_list".to_string(), serde_json::to_value(&character_list)?);

    state
        .workflows
        .create_session(&workflow_id, &session_id, data, events_tx)
        .await?;

    let frame = event_frame(
        "session_created",
        Some(session_id.as_str()),
        "session created",
    );
    let _ = out_tx.send(frame);

    let outcome = state.workflows.execute(&session_id).await?;
    report_outcome(out_tx, &session_id, &outcome);
    Ok(session_id)
}

fn report_outcome(
    out_tx: &mpsc::UnboundedSender<Value>,
    session_id: &SessionId,
    outcome: &WorkflowOutcome,
) {
    match outcome.status {
        WorkflowStatus::Completed => {
            let _ = out_tx.send(event_frame(
                "workflow_completed",
                Some(session_id.as_str()),
                "workflow completed",
            ));
        }
        WorkflowStatus::Failed => {
            let _ = out_tx.send(event_frame(
                "workflow_error",
                Some(session_id.as_str()),
                "workflow failed",
            ));
        }
        WorkflowStatus::Running | WorkflowStatus::Waiting => {}
    }
}
