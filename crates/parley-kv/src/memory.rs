// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process [`KvStore`] backend.
//!
//! Implements the full contract including TTLs, glob scans, and sorted
//! sets. Used by tests and by local single-process runs without Redis.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parley_core::{KvStore, ParleyError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| at > Instant::now())
    }
}

/// Glob matcher supporting `*` and `?`, the subset scan patterns use.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    fn inner(p: &[char], t: &[char]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..]))
            }
            (Some('?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(&p, &t)
}

/// An in-memory key-value store.
#[derive(Default)]
pub struct MemoryStore {
    strings: DashMap<String, Entry>,
    sets: DashMap<String, HashSet<String>>,
    zsets: DashMap<String, HashMap<String, f64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the entry when its TTL has lapsed, mimicking lazy expiry.
    fn purge_if_expired(&self, key: &str) {
        let expired = self.strings.get(key).is_some_and(|e| !e.live());
        if expired {
            self.strings.remove(key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.purge_if_expired(key);
        Ok(self.strings.get(key).map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), ParleyError> {
        self.strings.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        self.purge_if_expired(key);
        let had_string = self.strings.remove(key).is_some();
        let had_set = self.sets.remove(key).is_some();
        let had_zset = self.zsets.remove(key).is_some();
        Ok(had_string || had_set || had_zset)
    }

    async fn exists(&self, key: &str) -> Result<bool, ParleyError> {
        self.purge_if_expired(key);
        Ok(self.strings.contains_key(key)
            || self.sets.contains_key(key)
            || self.zsets.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
        self.purge_if_expired(key);
        match self.strings.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            // Set-typed keys carry TTLs too, but nothing reads them back.
            None => Ok(self.sets.contains_key(key) || self.zsets.contains_key(key)),
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError> {
        let mut keys: Vec<String> = self
            .strings
            .iter()
            .filter(|e| e.live() && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ParleyError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), ParleyError> {
        self.sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), ParleyError> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        let mut members: Vec<String> = self
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), ParleyError> {
        self.zsets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), ParleyError> {
        if let Some(mut zset) = self.zsets.get_mut(key) {
            zset.remove(member);
        }
        Ok(())
    }

    async fn zrevrangebyscore(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ParleyError> {
        let mut scored: Vec<(String, f64)> = self
            .zsets
            .get(key)
            .map(|z| {
                z.iter()
                    .filter(|(_, s)| **s >= min && **s <= max)
                    .map(|(m, s)| (m.clone(), *s))
                    .collect()
            })
            .unwrap_or_default();
        // Highest score first; ties break on member for determinism.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(scored
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(m, _)| m)
            .collect())
    }

    async fn ping(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_key_patterns() {
        assert!(glob_match("game:*:session:*", "game:turtle_soup:session:abc"));
        assert!(glob_match("prefix:*", "prefix:anything"));
        assert!(!glob_match("game:*:session:*", "game:turtle_soup:websockets:abc"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
    }

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn scan_filters_by_pattern() {
        let store = MemoryStore::new();
        store.set("game:a:session:1", "x", None).await.unwrap();
        store.set("game:b:session:2", "x", None).await.unwrap();
        store.set("other", "x", None).await.unwrap();
        let keys = store.scan("game:*:session:*").await.unwrap();
        assert_eq!(keys, vec!["game:a:session:1", "game:b:session:2"]);
    }

    #[tokio::test]
    async fn zrevrangebyscore_orders_and_limits() {
        let store = MemoryStore::new();
        store.zadd("levels", "level_1", 1.0).await.unwrap();
        store.zadd("levels", "level_5", 5.0).await.unwrap();
        store.zadd("levels", "level_10", 10.0).await.unwrap();

        let hit = store
            .zrevrangebyscore("levels", 7.0, f64::NEG_INFINITY, 0, 1)
            .await
            .unwrap();
        assert_eq!(hit, vec!["level_5"]);

        let all = store
            .zrevrangebyscore("levels", f64::INFINITY, f64::NEG_INFINITY, 0, 10)
            .await
            .unwrap();
        assert_eq!(all, vec!["level_10", "level_5", "level_1"]);
    }

    #[tokio::test]
    async fn set_members_round_trip() {
        let store = MemoryStore::new();
        store.sadd("ws", "a").await.unwrap();
        store.sadd("ws", "b").await.unwrap();
        store.srem("ws", "a").await.unwrap();
        assert_eq!(store.smembers("ws").await.unwrap(), vec!["b"]);
    }
}
