// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed JSON cache over a raw [`KvStore`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parley_core::{KvStore, ParleyError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Default key prefix. The spelling is inherited from the deployments this
/// server replaces and must not be corrected, or live keys go dark.
pub const DEFAULT_PREFIX: &str = "knowleadge_api:";

/// A typed cache namespace: prefixes keys and speaks JSON.
///
/// Decode failures and empty payloads read as misses so a poisoned key can
/// never wedge a caller; the bad payload is logged and left for overwrite.
pub struct KvCache<T> {
    store: Arc<dyn KvStore>,
    prefix: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for KvCache<T> {
    fn clone(&self) -> Self {
        KvCache {
            store: Arc::clone(&self.store),
            prefix: self.prefix.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> KvCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        KvCache {
            store,
            prefix: prefix.into(),
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.store)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>, ParleyError> {
        let full = self.full_key(key);
        let Some(raw) = self.store.get(&full).await? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key = %full, error = %err, "cached payload failed to decode, treating as miss");
                Ok(None)
            }
        }
    }

    pub async fn set(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), ParleyError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(&self.full_key(key), &raw, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        self.store.delete(&self.full_key(key)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, ParleyError> {
        self.store.exists(&self.full_key(key)).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
        self.store.expire(&self.full_key(key), ttl).await
    }

    /// All entries under `pattern` (unprefixed, glob), keys returned
    /// with the prefix stripped. Undecodable entries are skipped.
    pub async fn get_all(&self, pattern: &str) -> Result<Vec<(String, T)>, ParleyError> {
        let keys = self.store.scan(&self.full_key(pattern)).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values = self.store.mget(&keys).await?;
        let mut out = Vec::with_capacity(keys.len());
        for (key, raw) in keys.into_iter().zip(values) {
            let Some(raw) = raw else { continue };
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    let short = key
                        .strip_prefix(&self.prefix)
                        .unwrap_or(key.as_str())
                        .to_owned();
                    out.push((short, value));
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping undecodable cache entry");
                }
            }
        }
        Ok(out)
    }

    /// Deletes every key under `pattern`, returning how many went away.
    pub async fn clear(&self, pattern: &str) -> Result<usize, ParleyError> {
        let keys = self.store.scan(&self.full_key(pattern)).await?;
        let mut removed = 0;
        for key in keys {
            if self.store.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn zadd(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<(), ParleyError> {
        self.store.zadd(&self.full_key(key), member, score).await
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<(), ParleyError> {
        self.store.zrem(&self.full_key(key), member).await
    }

    /// Members with score in `[min, max]`, highest first.
    pub async fn zrevrangebyscore(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ParleyError> {
        self.store
            .zrevrangebyscore(&self.full_key(key), max, min, offset, limit)
            .await
    }
}
