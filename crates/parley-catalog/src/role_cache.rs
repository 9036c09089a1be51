// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Role table cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_core::{ConfigSource, KvStore, ParleyError, RoleRecord};
use parley_kv::KvCache;
use rand::seq::SliceRandom;
use tracing::debug;

const COLLECTION_KEY: &str = "role:all_roles";

fn point_key(role_id: &str) -> String {
    format!("role:{role_id}")
}

/// Caches [`RoleRecord`] rows.
pub struct RoleCache {
    list: KvCache<Vec<RoleRecord>>,
    point: KvCache<RoleRecord>,
    source: Arc<dyn ConfigSource>,
    enabled: AtomicBool,
}

impl RoleCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        prefix: &str,
        source: Arc<dyn ConfigSource>,
        enabled: bool,
    ) -> Self {
        RoleCache {
            list: KvCache::new(Arc::clone(&store), prefix),
            point: KvCache::new(store, prefix),
            source,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub async fn load_all(&self) -> Result<usize, ParleyError> {
        let rows = self.source.roles().await?;
        if self.enabled() {
            self.list.set(COLLECTION_KEY, &rows, None).await?;
            for row in &rows {
                self.point.set(&point_key(&row.role_id), row, None).await?;
            }
        }
        debug!(count = rows.len(), "role cache loaded");
        Ok(rows.len())
    }

    pub async fn get(&self, role_id: &str) -> Result<Option<RoleRecord>, ParleyError> {
        if self.enabled() {
            if let Some(row) = self.point.get(&point_key(role_id)).await? {
                return Ok(Some(row));
            }
        }
        let row = self.source.role(role_id).await?;
        if self.enabled() {
            if let Some(row) = &row {
                self.point.set(&point_key(role_id), row, None).await?;
            }
        }
        Ok(row)
    }

    pub async fn all(&self) -> Result<Vec<RoleRecord>, ParleyError> {
        if self.enabled() {
            if let Some(rows) = self.list.get(COLLECTION_KEY).await? {
                return Ok(rows);
            }
        }
        let rows = self.source.roles().await?;
        if self.enabled() {
            self.list.set(COLLECTION_KEY, &rows, None).await?;
        }
        Ok(rows)
    }

    /// Picks up to `count` distinct active roles at random, for seeding a
    /// table of AI players.
    pub async fn random_roles(&self, count: usize) -> Result<Vec<RoleRecord>, ParleyError> {
        let mut active: Vec<RoleRecord> =
            self.all().await?.into_iter().filter(|r| r.status).collect();
        active.shuffle(&mut rand::thread_rng());
        active.truncate(count);
        Ok(active)
    }
}
