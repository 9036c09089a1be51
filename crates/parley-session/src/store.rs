// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session persistence over the KV seam.
//!
//! Sessions live under `game:{type}:session:{id}` with a 7-day TTL and a
//! local in-process cache in front. A periodic sweep deletes sessions
//! idle past the configured threshold so abandoned games do not linger
//! for the full TTL.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parley_core::traits::KvStore;
use parley_core::{ParleyError, SessionId};
use tracing::{debug, info, warn};

use crate::session::{now_ms, GameSession};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(24 * 3600);

/// Minimum gap between opportunistic cleanup sweeps.
const SWEEP_INTERVAL_MS: i64 = 3600 * 1000;

/// KV-backed session store with a local cache.
pub struct SessionStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    max_idle: Duration,
    local: DashMap<String, GameSession>,
    last_sweep_ms: AtomicI64,
}

fn session_key(game_type: &str, session_id: &str) -> String {
    format!("game:{game_type}:session:{session_id}")
}

/// The hub's connection-id set for the same session.
fn websockets_key(game_type: &str, session_id: &str) -> String {
    format!("game:{game_type}:websockets:{session_id}")
}

impl SessionStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration, max_idle: Duration) -> Self {
        Self {
            store,
            ttl,
            max_idle,
            local: DashMap::new(),
            last_sweep_ms: AtomicI64::new(now_ms()),
        }
    }

    /// Persists a session, bumping its `updated_at` stamp.
    ///
    /// At most once per hour a save also sweeps idle sessions, so
    /// deployments without the periodic task still converge.
    pub async fn save(&self, session: &mut GameSession) -> Result<(), ParleyError> {
        session.updated_at = now_ms();
        let key = session_key(&session.game_type, &session.session_id);
        let encoded = serde_json::to_string(session)?;
        self.store.set(&key, &encoded, Some(self.ttl)).await?;
        self.local.insert(key, session.clone());

        if self.claim_sweep() {
            if let Err(e) = self.cleanup_expired().await {
                warn!(error = %e, "opportunistic session cleanup failed");
            }
        }
        Ok(())
    }

    fn claim_sweep(&self) -> bool {
        let now = now_ms();
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        now - last > SWEEP_INTERVAL_MS
            && self
                .last_sweep_ms
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }

    /// Loads a session by game type and id.
    ///
    /// The driver task is the sole writer per session, so the local cache
    /// answers first; the KV store backs it for reconnects landing on a
    /// fresh process.
    pub async fn load(
        &self,
        game_type: &str,
        session_id: &SessionId,
    ) -> Result<Option<GameSession>, ParleyError> {
        let key = session_key(game_type, session_id.as_str());
        if let Some(entry) = self.local.get(&key) {
            return Ok(Some(entry.clone()));
        }
        match self.store.get(&key).await? {
            Some(raw) => match serde_json::from_str::<GameSession>(&raw) {
                Ok(session) => {
                    self.local.insert(key, session.clone());
                    Ok(Some(session))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "undecodable session blob, treating as absent");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Refreshes the activity stamp and TTL without other changes.
    pub async fn touch(
        &self,
        game_type: &str,
        session_id: &SessionId,
    ) -> Result<(), ParleyError> {
        if let Some(mut session) = self.load(game_type, session_id).await? {
            self.save(&mut session).await?;
        }
        Ok(())
    }

    /// True when a session blob exists.
    pub async fn exists(
        &self,
        game_type: &str,
        session_id: &SessionId,
    ) -> Result<bool, ParleyError> {
        let key = session_key(game_type, session_id.as_str());
        if self.local.contains_key(&key) {
            return Ok(true);
        }
        self.store.exists(&key).await
    }

    /// Loads a session by id alone, scanning across game types.
    pub async fn load_any(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<GameSession>, ParleyError> {
        let pattern = format!("game:*:session:{}", session_id.as_str());
        let keys = self.store.scan(&pattern).await?;
        let Some(key) = keys.first() else {
            return Ok(self
                .local
                .iter()
                .find(|entry| entry.session_id == session_id.as_str())
                .map(|entry| entry.clone()));
        };
        match self.store.get(key).await? {
            Some(raw) => {
                let session: GameSession = serde_json::from_str(&raw)?;
                self.local.insert(key.clone(), session.clone());
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Deletes a session from the store and the local cache.
    pub async fn delete(&self, game_type: &str, session_id: &SessionId) -> Result<(), ParleyError> {
        let key = session_key(game_type, session_id.as_str());
        self.store.delete(&key).await?;
        self.store
            .delete(&websockets_key(game_type, session_id.as_str()))
            .await?;
        self.local.remove(&key);
        Ok(())
    }

    /// Deletes sessions idle past the threshold. Returns how many went.
    pub async fn cleanup_expired(&self) -> Result<usize, ParleyError> {
        let keys = self.store.scan("game:*:session:*").await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let now = now_ms();
        let max_idle_ms = self.max_idle.as_millis() as i64;
        let values = self.store.mget(&keys).await?;
        let mut removed = 0;

        for (key, value) in keys.iter().zip(values) {
            let Some(raw) = value else { continue };
            let idle = match serde_json::from_str::<GameSession>(&raw) {
                Ok(session) => session.idle_ms(now),
                // Undecodable blobs are dead weight, sweep them too.
                Err(_) => i64::MAX,
            };
            if idle > max_idle_ms {
                self.store.delete(key).await?;
                self.store
                    .delete(&key.replacen(":session:", ":websockets:", 1))
                    .await?;
                self.local.remove(key);
                removed += 1;
                debug!(key = %key, idle_ms = idle, "swept idle session");
            }
        }

        if removed > 0 {
            info!(removed, "session cleanup pass finished");
        }
        Ok(removed)
    }

    /// Runs `cleanup_expired` on an interval until the handle is aborted.
    pub fn start_cleanup(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.cleanup_expired().await {
                    warn!(error = %e, "session cleanup pass failed");
                }
            }
        })
    }
}
