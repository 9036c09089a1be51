// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt table cache with level-indexed lookup.
//!
//! Prompts are grouped per role. Alongside the collection and point keys,
//! a sorted set scores each available level by its numeric value so
//! "highest level at or below N" resolves in one ZREVRANGEBYSCORE. Only
//! enabled rows are indexed; a reload drops the role's previous index
//! before writing the new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_core::{ConfigSource, KvStore, ParleyError, PromptRecord};
use parley_kv::KvCache;
use tracing::{debug, warn};

fn collection_key(role_id: &str) -> String {
    format!("character_prompt:role:{role_id}")
}

fn point_key(role_id: &str, level: f64) -> String {
    format!("character_prompt:role:{role_id}:level:{level}")
}

fn levels_key(role_id: &str) -> String {
    format!("character_prompt:role:{role_id}:levels")
}

fn level_member(level: f64) -> String {
    format!("level_{level}")
}

fn parse_level_member(member: &str) -> Option<f64> {
    member.strip_prefix("level_")?.parse().ok()
}

/// Caches [`PromptRecord`] rows per role with a level index.
pub struct PromptCache {
    list: KvCache<Vec<PromptRecord>>,
    point: KvCache<PromptRecord>,
    source: Arc<dyn ConfigSource>,
    enabled: AtomicBool,
}

impl PromptCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        prefix: &str,
        source: Arc<dyn ConfigSource>,
        enabled: bool,
    ) -> Self {
        PromptCache {
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

    /// Repopulates all three key shapes for every role in the source.
    ///
    /// Roles whose rows are all disabled still pass through
    /// `populate_role` so their stale index entries get cleared.
    pub async fn load_all(&self) -> Result<usize, ParleyError> {
        let rows = self.source.prompts().await?;
        if self.enabled() {
            let mut by_role: std::collections::HashMap<String, Vec<PromptRecord>> =
                std::collections::HashMap::new();
            for row in &rows {
                by_role
                    .entry(row.role_id.clone())
                    .or_default()
                    .push(row.clone());
            }
            for (role_id, group) in by_role {
                self.populate_role(&role_id, &group).await?;
            }
        }
        debug!(count = rows.len(), "prompt cache loaded");
        Ok(rows.len())
    }

    /// Rebuilds the role's collection, point keys and level zset from
    /// `group`, keeping enabled rows only. The previous index is deleted
    /// first so removed or disabled levels cannot survive a reload.
    async fn populate_role(
        &self,
        role_id: &str,
        group: &[PromptRecord],
    ) -> Result<(), ParleyError> {
        if let Some(old) = self.list.get(&collection_key(role_id)).await? {
            for row in &old {
                self.point.delete(&point_key(role_id, row.level)).await?;
            }
        }
        self.list.delete(&levels_key(role_id)).await?;

        let enabled: Vec<PromptRecord> =
            group.iter().filter(|r| r.status).cloned().collect();
        self.list
            .set(&collection_key(role_id), &enabled, None)
            .await?;
        for row in &enabled {
            self.point
                .set(&point_key(role_id, row.level), row, None)
                .await?;
            self.list
                .zadd(&levels_key(role_id), &level_member(row.level), row.level)
                .await?;
        }
        Ok(())
    }

    /// Exact-level fetch, reading through to the source on a miss.
    pub async fn get(
        &self,
        role_id: &str,
        level: f64,
    ) -> Result<Option<PromptRecord>, ParleyError> {
        if self.enabled() {
            if let Some(row) = self.point.get(&point_key(role_id, level)).await? {
                if row.status {
                    return Ok(Some(row));
                }
            }
        }
        let group = self.source.prompts_for_role(role_id).await?;
        let hit = group
            .iter()
            .find(|r| r.status && r.level == level)
            .cloned();
        if self.enabled() && !group.is_empty() {
            self.populate_role(role_id, &group).await?;
        }
        Ok(hit)
    }

    /// Returns the prompt with the highest level at or below `level`.
    ///
    /// Resolution order: sorted-set index, then a scan of the cached
    /// collection, then the relational source (which also refills the
    /// cache). Returns `None` when the role has no enabled prompt at or
    /// below the requested level.
    pub async fn get_nearest(
        &self,
        role_id: &str,
        level: f64,
    ) -> Result<Option<PromptRecord>, ParleyError> {
        if self.enabled() {
            let members = self
                .list
                .zrevrangebyscore(&levels_key(role_id), level, f64::NEG_INFINITY, 0, 1)
                .await?;
            if let Some(member) = members.first() {
                match parse_level_member(member) {
                    Some(found) => {
                        if let Some(row) =
                            self.point.get(&point_key(role_id, found)).await?
                        {
                            if row.status {
                                return Ok(Some(row));
                            }
                        }
                    }
                    None => {
                        warn!(role_id, member = %member, "malformed level index member");
                    }
                }
            }

            // Index missed; the collection may still be warm.
            if let Some(group) = self.list.get(&collection_key(role_id)).await? {
                if let Some(row) = nearest_at_or_below(&group, level) {
                    return Ok(Some(row));
                }
            }
        }

        let group = self.source.prompts_for_role(role_id).await?;
        let hit = nearest_at_or_below(&group, level);
        if self.enabled() && !group.is_empty() {
            self.populate_role(role_id, &group).await?;
        }
        Ok(hit)
    }
}

fn nearest_at_or_below(group: &[PromptRecord], level: f64) -> Option<PromptRecord> {
    group
        .iter()
        .filter(|r| r.status && r.level <= level)
        .max_by(|a, b| a.level.total_cmp(&b.level))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(level: f64, status: bool) -> PromptRecord {
        PromptRecord {
            id: level as i64,
            role_id: "npc".into(),
            level,
            prompt_text: format!("prompt at {level}"),
            prompt_type: "system".into(),
            status,
        }
    }

    #[test]
    fn level_members_round_trip() {
        assert_eq!(level_member(12.0), "level_12");
        assert_eq!(level_member(1.5), "level_1.5");
        assert_eq!(parse_level_member("level_12"), Some(12.0));
        assert_eq!(parse_level_member("level_1.5"), Some(1.5));
        assert_eq!(parse_level_member("lvl_12"), None);
    }

    #[test]
    fn nearest_skips_disabled_and_higher_levels() {
        let group = vec![prompt(1.0, true), prompt(5.0, false), prompt(10.0, true)];
        assert_eq!(nearest_at_or_below(&group, 7.0).map(|r| r.level), Some(1.0));
        assert_eq!(
            nearest_at_or_below(&group, 10.0).map(|r| r.level),
            Some(10.0)
        );
        assert_eq!(nearest_at_or_below(&group, 0.5), None);
    }

    #[test]
    fn nearest_resolves_fractional_levels() {
        let group = vec![prompt(1.5, true), prompt(2.5, true)];
        assert_eq!(nearest_at_or_below(&group, 2.0).map(|r| r.level), Some(1.5));
    }
}
