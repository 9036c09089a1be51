// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis [`KvStore`] backend over a multiplexed connection manager.
//!
//! In-flight commands are capped at `max_connections` and a background
//! task pings the server on an interval so a dead link is noticed and
//! re-established before the next request hits it. Every command runs
//! under a retry policy: up to three attempts with exponential backoff
//! when the server reports connection exhaustion, fail-fast on anything
//! else.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::{KvStore, ParleyError};
use redis::aio::ConnectionManager;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const SCAN_COUNT: usize = 100;

/// Connection settings for the Redis backend.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// Per-command timeout.
    pub response_timeout: Duration,
    /// Cap on concurrently in-flight commands.
    pub max_connections: usize,
    /// How often the background health ping runs.
    pub health_check_interval: Duration,
}

impl Default for RedisSettings {
    fn default() -> Self {
        RedisSettings {
            host: "127.0.0.1".into(),
            port: 6379,
            db: 0,
            password: None,
            response_timeout: Duration::from_secs(5),
            max_connections: 10,
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl RedisSettings {
    fn url(&self) -> String {
        match &self.password {
            Some(password) => {
                format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db)
            }
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Redis-backed key-value store.
pub struct RedisStore {
    manager: ConnectionManager,
    limiter: Arc<Semaphore>,
    health_task: Option<tokio::task::JoinHandle<()>>,
}

fn is_pool_exhausted(err: &redis::RedisError) -> bool {
    err.to_string().to_lowercase().contains("too many connections")
}

impl RedisStore {
    /// Connects and verifies the server with an initial PING.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, ParleyError> {
        let client = redis::Client::open(settings.url()).map_err(ParleyError::kv)?;
        let config = redis::aio::ConnectionManagerConfig::new()
            .set_response_timeout(settings.response_timeout);
        let manager = ConnectionManager::new_with_config(client, config)
            .await
            .map_err(ParleyError::kv)?;
        let health_task = spawn_health_check(manager.clone(), settings.health_check_interval);
        let store = RedisStore {
            manager,
            limiter: Arc::new(Semaphore::new(settings.max_connections.max(1))),
            health_task: Some(health_task),
        };
        store.ping().await?;
        Ok(store)
    }

    /// Runs a command with backoff of 0.1 * 2^attempt seconds on
    /// connection exhaustion. The manager reconnects underneath. A
    /// semaphore permit bounds how many commands are in flight at once.
    async fn with_retry<T, F, Fut>(&self, f: F) -> Result<T, ParleyError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, redis::RedisError>>,
    {
        let _permit = self.limiter.acquire().await.map_err(ParleyError::kv)?;
        let mut attempt: u32 = 0;
        loop {
            match f(self.manager.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < MAX_ATTEMPTS && is_pool_exhausted(&err) => {
                    let wait = Duration::from_millis(100 * (1 << attempt));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "redis connections exhausted, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(ParleyError::kv(err)),
            }
        }
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        if let Some(task) = self.health_task.take() {
            task.abort();
        }
    }
}

/// Pings the server on an interval. A failed ping forces the manager to
/// tear down the dead link and reconnect instead of leaving the first
/// real command to eat the failure.
fn spawn_health_check(manager: ConnectionManager, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let mut conn = manager.clone();
            match redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => debug!("redis health ping ok"),
                Err(error) => warn!(%error, "redis health ping failed, manager will reconnect"),
            }
        }
    })
}

fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".into()
    } else if score == f64::NEG_INFINITY {
        "-inf".into()
    } else {
        score.to_string()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        let key = key.to_owned();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move {
                redis::cmd("GET").arg(&key).query_async(&mut conn).await
            }
        })
        .await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), ParleyError> {
        let key = key.to_owned();
        let value = value.to_owned();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let value = value.clone();
            async move {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&key).arg(&value);
                if let Some(ttl) = ttl {
                    cmd.arg("EX").arg(ttl.as_secs().max(1));
                }
                cmd.query_async::<()>(&mut conn).await
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        let key = key.to_owned();
        let removed: i64 = self
            .with_retry(move |mut conn| {
                let key = key.clone();
                async move { redis::cmd("DEL").arg(&key).query_async(&mut conn).await }
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, ParleyError> {
        let key = key.to_owned();
        let found: i64 = self
            .with_retry(move |mut conn| {
                let key = key.clone();
                async move { redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await }
            })
            .await?;
        Ok(found > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
        let key = key.to_owned();
        let set: i64 = self
            .with_retry(move |mut conn| {
                let key = key.clone();
                async move {
                    redis::cmd("EXPIRE")
                        .arg(&key)
                        .arg(ttl.as_secs().max(1))
                        .query_async(&mut conn)
                        .await
                }
            })
            .await?;
        Ok(set > 0)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError> {
        let pattern = pattern.to_owned();
        self.with_retry(move |mut conn| {
            let pattern = pattern.clone();
            async move {
                let mut cursor: u64 = 0;
                let mut keys = Vec::new();
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn)
                        .await?;
                    keys.extend(batch);
                    cursor = next;
                    if cursor == 0 {
                        break;
                    }
                }
                Ok(keys)
            }
        })
        .await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ParleyError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys = keys.to_vec();
        self.with_retry(move |mut conn| {
            let keys = keys.clone();
            async move {
                let mut cmd = redis::cmd("MGET");
                for key in &keys {
                    cmd.arg(key);
                }
                cmd.query_async(&mut conn).await
            }
        })
        .await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), ParleyError> {
        let key = key.to_owned();
        let member = member.to_owned();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let member = member.clone();
            async move {
                redis::cmd("SADD")
                    .arg(&key)
                    .arg(&member)
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), ParleyError> {
        let key = key.to_owned();
        let member = member.to_owned();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let member = member.clone();
            async move {
                redis::cmd("SREM")
                    .arg(&key)
                    .arg(&member)
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        let key = key.to_owned();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { redis::cmd("SMEMBERS").arg(&key).query_async(&mut conn).await }
        })
        .await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), ParleyError> {
        let key = key.to_owned();
        let member = member.to_owned();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let member = member.clone();
            async move {
                redis::cmd("ZADD")
                    .arg(&key)
                    .arg(score)
                    .arg(&member)
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), ParleyError> {
        let key = key.to_owned();
        let member = member.to_owned();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let member = member.clone();
            async move {
                redis::cmd("ZREM")
                    .arg(&key)
                    .arg(&member)
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn zrevrangebyscore(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, ParleyError> {
        let key = key.to_owned();
        let max = score_arg(max);
        let min = score_arg(min);
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let max = max.clone();
            let min = min.clone();
            async move {
                redis::cmd("ZREVRANGEBYSCORE")
                    .arg(&key)
                    .arg(&max)
                    .arg(&min)
                    .arg("LIMIT")
                    .arg(offset)
                    .arg(limit)
                    .query_async(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn ping(&self) -> Result<(), ParleyError> {
        self.with_retry(move |mut conn| async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await?;
        Ok(())
    }
}
