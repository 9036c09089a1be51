// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider table cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_core::{ConfigSource, KvStore, ParleyError, ProviderRecord};
use parley_kv::KvCache;
use tracing::debug;

const COLLECTION_KEY: &str = "llm_provider:all_providers";

fn point_key(id: i64) -> String {
    format!("llm_provider:id:{id}")
}

/// Caches [`ProviderRecord`] rows under a collection key plus point keys.
pub struct ProviderCache {
    list: KvCache<Vec<ProviderRecord>>,
    point: KvCache<ProviderRecord>,
    source: Arc<dyn ConfigSource>,
    enabled: AtomicBool,
}

impl ProviderCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        prefix: &str,
        source: Arc<dyn ConfigSource>,
        enabled: bool,
    ) -> Self {
        ProviderCache {
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

    /// Repopulates the collection key and every point key from the source.
    pub async fn load_all(&self) -> Result<usize, ParleyError> {
        let rows = self.source.providers().await?;
        if self.enabled() {
            self.list.set(COLLECTION_KEY, &rows, None).await?;
            for row in &rows {
                self.point.set(&point_key(row.id), row, None).await?;
            }
        }
        debug!(count = rows.len(), "provider cache loaded");
        Ok(rows.len())
    }

    pub async fn get(&self, id: i64) -> Result<Option<ProviderRecord>, ParleyError> {
        if self.enabled() {
            if let Some(row) = self.point.get(&point_key(id)).await? {
                return Ok(Some(row));
            }
        }
        let row = self.source.provider(id).await?;
        if self.enabled() {
            if let Some(row) = &row {
                self.point.set(&point_key(id), row, None).await?;
            }
        }
        Ok(row)
    }

    pub async fn all(&self) -> Result<Vec<ProviderRecord>, ParleyError> {
        if self.enabled() {
            if let Some(rows) = self.list.get(COLLECTION_KEY).await? {
                return Ok(rows);
            }
        }
        let rows = self.source.providers().await?;
        if self.enabled() {
            self.list.set(COLLECTION_KEY, &rows, None).await?;
        }
        Ok(rows)
    }

    /// Writes an updated record to both key shapes.
    pub async fn update(&self, row: &ProviderRecord) -> Result<(), ParleyError> {
        if !self.enabled() {
            return Ok(());
        }
        self.point.set(&point_key(row.id), row, None).await?;
        let mut rows = self.all().await?;
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        self.list.set(COLLECTION_KEY, &rows, None).await
    }

    pub async fn remove(&self, id: i64) -> Result<(), ParleyError> {
        if !self.enabled() {
            return Ok(());
        }
        self.point.delete(&point_key(id)).await?;
        let mut rows = self.all().await?;
        rows.retain(|r| r.id != id);
        self.list.set(COLLECTION_KEY, &rows, None).await
    }
}
