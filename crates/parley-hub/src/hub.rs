// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session message fan-out.
//!
//! Each session owns a set of live websocket connections. Broadcasts go
//! to every live connection; when none are live the messages queue and
//! replay to the next connection that registers. Connection membership
//! is mirrored into a KV set so other nodes can see who is attached.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parley_core::traits::KvStore;
use parley_core::{GameMessage, ParleyError, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Gap between replayed messages so clients render them in order.
const REPLAY_SPACING: Duration = Duration::from_millis(50);

/// TTL on the KV connection-membership set.
const WS_SET_TTL: Duration = Duration::from_secs(86_400);

struct Connection {
    ws_id: String,
    sender: mpsc::UnboundedSender<GameMessage>,
}

#[derive(Default)]
struct SessionEntry {
    connections: Vec<Connection>,
    pending: VecDeque<GameMessage>,
    seen: HashSet<String>,
}

/// Fan-out hub over all active sessions.
pub struct Hub {
    sessions: DashMap<String, SessionEntry>,
    store: Arc<dyn KvStore>,
}

fn ws_set_key(game_type: &str, session_id: &str) -> String {
    format!("game:{game_type}:websockets:{session_id}")
}

impl Hub {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
        }
    }

    /// Registers a new connection for a session.
    ///
    /// Returns the connection id and the receiving half the socket task
    /// drains. The session transcript plus any queued messages replay
    /// into the new connection with a short gap between each.
    pub async fn register(
        &self,
        game_type: &str,
        session_id: &SessionId,
        transcript: &[GameMessage],
    ) -> Result<(String, mpsc::UnboundedReceiver<GameMessage>), ParleyError> {
        let ws_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut replay: Vec<GameMessage> = transcript.to_vec();
        {
            let mut entry = self
                .sessions
                .entry(session_id.as_str().to_string())
                .or_default();
            replay.extend(entry.pending.drain(..));
            entry.connections.push(Connection {
                ws_id: ws_id.clone(),
                sender: sender.clone(),
            });
        }

        let set_key = ws_set_key(game_type, session_id.as_str());
        self.store.sadd(&set_key, &ws_id).await?;
        self.store.expire(&set_key, WS_SET_TTL).await?;

        debug!(
            session_id = %session_id,
            ws_id = %ws_id,
            replay = replay.len(),
            "connection registered"
        );

        if !replay.is_empty() {
            tokio::spawn(async move {
                for message in replay {
                    if sender.send(message).is_err() {
                        break;
                    }
                    tokio::time::sleep(REPLAY_SPACING).await;
                }
            });
        }

        Ok((ws_id, receiver))
    }

    /// Removes a connection and its KV set membership.
    pub async fn unregister(
        &self,
        game_type: &str,
        session_id: &SessionId,
        ws_id: &str,
    ) -> Result<(), ParleyError> {
        if let Some(mut entry) = self.sessions.get_mut(session_id.as_str()) {
            entry.connections.retain(|c| c.ws_id != ws_id);
        }
        self.store
            .srem(&ws_set_key(game_type, session_id.as_str()), ws_id)
            .await?;
        debug!(session_id = %session_id, ws_id = %ws_id, "connection unregistered");
        Ok(())
    }

    /// Broadcasts a message to every live connection of its session.
    ///
    /// Messages already broadcast (same `msg_id`) are dropped. Closed
    /// connections are reaped on the way; when nothing is live the
    /// message queues for the next registration.
    pub fn broadcast(&self, session_id: &SessionId, message: GameMessage) {
        if message.session_id != session_id.as_str() {
            warn!(
                session_id = %session_id,
                message_session = %message.session_id,
                "dropping message addressed to a different session"
            );
            return;
        }

        let mut entry = self
            .sessions
            .entry(session_id.as_str().to_string())
            .or_default();

        if !entry.seen.insert(message.msg_id.clone()) {
            debug!(msg_id = %message.msg_id, "skipping duplicate broadcast");
            return;
        }

        entry
            .connections
            .retain(|c| c.sender.send(message.clone()).is_ok());
        if entry.connections.is_empty() {
            entry.pending.push_back(message);
        }
    }

    /// Number of live connections for a session.
    pub fn connection_count(&self, session_id: &SessionId) -> usize {
        self.sessions
            .get(session_id.as_str())
            .map(|entry| entry.connections.len())
            .unwrap_or(0)
    }

    /// Drops all hub state for a finished session.
    pub async fn drop_session(
        &self,
        game_type: &str,
        session_id: &SessionId,
    ) -> Result<(), ParleyError> {
        self.sessions.remove(session_id.as_str());
        self.store
            .delete(&ws_set_key(game_type, session_id.as_str()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_test_utils::memory_store;

    fn message(session: &str, content: &str) -> GameMessage {
        GameMessage::new(&SessionId(session.into()), "assistant", content)
    }

    #[tokio::test]
    async fn broadcast_reaches_registered_connection() {
        let hub = Hub::new(memory_store());
        let id = SessionId("s1".into());
        let (_ws, mut rx) = hub.register("turtle_soup", &id, &[]).await.unwrap();

        hub.broadcast(&id, message("s1", "hello"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.content, "hello");
    }

    #[tokio::test]
    async fn duplicate_msg_ids_are_dropped() {
        let hub = Hub::new(memory_store());
        let id = SessionId("s1".into());
        let (_ws, mut rx) = hub.register("turtle_soup", &id, &[]).await.unwrap();

        let msg = message("s1", "once");
        hub.broadcast(&id, msg.clone());
        hub.broadcast(&id, msg);
        assert_eq!(rx.recv().await.unwrap().content, "once");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn wrong_session_messages_are_rejected() {
        let hub = Hub::new(memory_store());
        let id = SessionId("s1".into());
        let (_ws, mut rx) = hub.register("turtle_soup", &id, &[]).await.unwrap();

        hub.broadcast(&id, message("other", "stray"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_messages_replay_on_register() {
        let hub = Hub::new(memory_store());
        let id = SessionId("s1".into());

        hub.broadcast(&id, message("s1", "queued one"));
        hub.broadcast(&id, message("s1", "queued two"));

        let (_ws, mut rx) = hub.register("turtle_soup", &id, &[]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().content, "queued one");
        assert_eq!(rx.recv().await.unwrap().content, "queued two");
    }

    #[tokio::test(start_paused = true)]
    async fn transcript_replays_before_pending() {
        let hub = Hub::new(memory_store());
        let id = SessionId("s1".into());
        hub.broadcast(&id, message("s1", "pending"));

        let transcript = vec![message("s1", "old one"), message("s1", "old two")];
        let (_ws, mut rx) = hub.register("turtle_soup", &id, &transcript).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().content, "old one");
        assert_eq!(rx.recv().await.unwrap().content, "old two");
        assert_eq!(rx.recv().await.unwrap().content, "pending");
    }

    #[tokio::test]
    async fn unregister_reaps_connection_and_queues_later_messages() {
        let hub = Hub::new(memory_store());
        let id = SessionId("s1".into());
        let (ws_id, rx) = hub.register("turtle_soup", &id, &[]).await.unwrap();
        drop(rx);
        hub.unregister("turtle_soup", &id, &ws_id).await.unwrap();
        assert_eq!(hub.connection_count(&id), 0);

        hub.broadcast(&id, message("s1", "while away"));
        let (_ws2, mut rx2) = hub.register("turtle_soup", &id, &[]).await.unwrap();
        assert_eq!(rx2.recv().await.unwrap().content, "while away");
    }

    #[tokio::test]
    async fn membership_set_tracks_connections() {
        let store = memory_store();
        let hub = Hub::new(store.clone());
        let id = SessionId("s1".into());
        let (ws_id, _rx) = hub.register("turtle_soup", &id, &[]).await.unwrap();

        let members = store
            .smembers("game:turtle_soup:websockets:s1")
            .await
            .unwrap();
        assert_eq!(members, vec![ws_id.clone()]);

        hub.unregister("turtle_soup", &id, &ws_id).await.unwrap();
        let members = store
            .smembers("game:turtle_soup:websockets:s1")
            .await
            .unwrap();
        assert!(members.is_empty());
    }
}
