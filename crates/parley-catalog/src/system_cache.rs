// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System configuration cache (flat key-value rows).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_core::{ConfigSource, KvStore, ParleyError, SystemConfigRecord};
use parley_kv::KvCache;
use tracing::debug;

const COLLECTION_KEY: &str = "system_config:all_configs";

fn point_key(key: &str) -> String {
    format!("system_config:{key}")
}

/// Caches [`SystemConfigRecord`] rows.
pub struct SystemConfigCache {
    list: KvCache<Vec<SystemConfigRecord>>,
    point: KvCache<SystemConfigRecord>,
    source: Arc<dyn ConfigSource>,
    enabled: AtomicBool,
}

impl SystemConfigCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        prefix: &str,
        source: Arc<dyn ConfigSource>,
        enabled: bool,
    ) -> Self {
        SystemConfigCache {
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
        let rows = self.source.system_configs().await?;
        if self.enabled() {
            self.list.set(COLLECTION_KEY, &rows, None).await?;
            for row in &rows {
                self.point.set(&point_key(&row.key), row, None).await?;
            }
        }
        debug!(count = rows.len(), "system config cache loaded");
        Ok(rows.len())
    }

    /// Fetch a single config value by key.
    pub async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        if self.enabled() {
            if let Some(row) = self.point.get(&point_key(key)).await? {
                return Ok(Some(row.value));
            }
        }
        let rows = self.source.system_configs().await?;
        let hit = rows.iter().find(|r| r.key == key).cloned();
        if self.enabled() {
            if let Some(row) = &hit {
                self.point.set(&point_key(key), row, None).await?;
            }
        }
        Ok(hit.map(|r| r.value))
    }
}
