// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model table cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_core::{ConfigSource, KvStore, ModelRecord, ParleyError};
use parley_kv::KvCache;
use tracing::debug;

const COLLECTION_KEY: &str = "llm_model:all_models";

fn point_key(model_id: &str) -> String {
    format!("llm_model:model:{model_id}")
}

/// Caches [`ModelRecord`] rows keyed by vendor model id.
pub struct ModelCache {
    list: KvCache<Vec<ModelRecord>>,
    point: KvCache<ModelRecord>,
    source: Arc<dyn ConfigSource>,
    enabled: AtomicBool,
}

impl ModelCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        prefix: &str,
        source: Arc<dyn ConfigSource>,
        enabled: bool,
    ) -> Self {
        ModelCache {
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
        let rows = self.source.models().await?;
        if self.enabled() {
            self.list.set(COLLECTION_KEY, &rows, None).await?;
            for row in &rows {
                self.point.set(&point_key(&row.model_id), row, None).await?;
            }
        }
        debug!(count = rows.len(), "model cache loaded");
        Ok(rows.len())
    }

    pub async fn get(&self, model_id: &str) -> Result<Option<ModelRecord>, ParleyError> {
        if self.enabled() {
            if let Some(row) = self.point.get(&point_key(model_id)).await? {
                return Ok(Some(row));
            }
        }
        let row = self.source.model(model_id).await?;
        if self.enabled() {
            if let Some(row) = &row {
                self.point.set(&point_key(model_id), row, None).await?;
            }
        }
        Ok(row)
    }

    pub async fn all(&self) -> Result<Vec<ModelRecord>, ParleyError> {
        if self.enabled() {
            if let Some(rows) = self.list.get(COLLECTION_KEY).await? {
                return Ok(rows);
            }
        }
        let rows = self.source.models().await?;
        if self.enabled() {
            self.list.set(COLLECTION_KEY, &rows, None).await?;
        }
        Ok(rows)
    }

    pub async fn update(&self, row: &ModelRecord) -> Result<(), ParleyError> {
        if !self.enabled() {
            return Ok(());
        }
        self.point.set(&point_key(&row.model_id), row, None).await?;
        let mut rows = self.all().await?;
        match rows.iter_mut().find(|r| r.model_id == row.model_id) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        self.list.set(COLLECTION_KEY, &rows, None).await
    }

    pub async fn remove(&self, model_id: &str) -> Result<(), ParleyError> {
        if !self.enabled() {
            return Ok(());
        }
        self.point.delete(&point_key(model_id)).await?;
        let mut rows = self.all().await?;
        rows.retain(|r| r.model_id != model_id);
        self.list.set(COLLECTION_KEY, &rows, None).await
    }
}
