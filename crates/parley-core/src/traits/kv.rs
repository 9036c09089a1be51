// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value backend seam (Redis in production, in-memory in tests).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ParleyError;

/// Raw string key-value backend.
///
/// Keys arriving here are already fully prefixed; the typed cache layer
/// above owns namespacing and the JSON codec.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError>;

    /// Sets a value, optionally with a time-to-live.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), ParleyError>;

    /// Deletes a key. Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, ParleyError>;

    async fn exists(&self, key: &str) -> Result<bool, ParleyError>;

    /// Resets a key's time-to-live. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError>;

    /// Returns all keys matching a glob pattern (cursor-based underneath).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ParleyError>;

    // Set operations, used for connection observability.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), ParleyError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), ParleyError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, ParleyError>;

    // Sorted-set operations, used for level-indexed prompt lookup.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), ParleyError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<(), ParleyError>;

    /// Members with `min <= score <= max`, highest score first.
    async fn zrevrangebyscore(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ParleyError>;

    /// Health check round trip.
    async fn ping(&self) -> Result<(), ParleyError>;
}
