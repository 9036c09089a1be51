// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate handle over all config caches.

use std::sync::Arc;

use parley_core::{
    ConfigSource, KvStore, ModelRecord, ParleyError, ProviderRecord,
};
use tracing::info;

use crate::model_cache::ModelCache;
use crate::prompt_cache::PromptCache;
use crate::provider_cache::ProviderCache;
use crate::role_cache::RoleCache;
use crate::system_cache::SystemConfigCache;

/// Per-cache enable flags, mirrored from the server configuration.
#[derive(Debug, Clone, Copy)]
pub struct CacheFlags {
    pub providers: bool,
    pub models: bool,
    pub prompts: bool,
    pub roles: bool,
    pub system: bool,
}

impl Default for CacheFlags {
    fn default() -> Self {
        CacheFlags {
            providers: true,
            models: true,
            prompts: true,
            roles: true,
            system: true,
        }
    }
}

/// One handle over every config cache, shared across the server.
pub struct CatalogManager {
    pub providers: ProviderCache,
    pub models: ModelCache,
    pub prompts: PromptCache,
    pub roles: RoleCache,
    pub system: SystemConfigCache,
}

impl CatalogManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        prefix: &str,
        source: Arc<dyn ConfigSource>,
        flags: CacheFlags,
    ) -> Self {
        CatalogManager {
            providers: ProviderCache::new(
                Arc::clone(&store),
                prefix,
                Arc::clone(&source),
                flags.providers,
            ),
            models: ModelCache::new(
                Arc::clone(&store),
                prefix,
                Arc::clone(&source),
                flags.models,
            ),
            prompts: PromptCache::new(
                Arc::clone(&store),
                prefix,
                Arc::clone(&source),
                flags.prompts,
            ),
            roles: RoleCache::new(
                Arc::clone(&store),
                prefix,
                Arc::clone(&source),
                flags.roles,
            ),
            system: SystemConfigCache::new(store, prefix, source, flags.system),
        }
    }

    /// Warms every cache from the relational source.
    pub async fn refresh_all(&self) -> Result<(), ParleyError> {
        let providers = self.providers.load_all().await?;
        let models = self.models.load_all().await?;
        let prompts = self.prompts.load_all().await?;
        let roles = self.roles.load_all().await?;
        let system = self.system.load_all().await?;
        info!(providers, models, prompts, roles, system, "catalog refreshed");
        Ok(())
    }

    /// Resolves a model together with the provider account serving it.
    pub async fn model_with_provider(
        &self,
        model_id: &str,
    ) -> Result<Option<(ModelRecord, ProviderRecord)>, ParleyError> {
        let Some(model) = self.models.get(model_id).await? else {
            return Ok(None);
        };
        let Some(provider) = self.providers.get(model.provider_id).await? else {
            return Ok(None);
        };
        Ok(Some((model, provider)))
    }
}
