// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relational fallback seam behind the config caches.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::records::{
    ModelRecord, PromptRecord, ProviderRecord, RoleRecord, SystemConfigRecord,
};

/// Read-side source of truth for catalog entities.
///
/// The cache layer consults this on misses and at warm-up; implementations
/// are the SQLite store in production and an in-memory fake in tests.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    async fn providers(&self) -> Result<Vec<ProviderRecord>, ParleyError>;
    async fn provider(&self, id: i64) -> Result<Option<ProviderRecord>, ParleyError>;

    async fn models(&self) -> Result<Vec<ModelRecord>, ParleyError>;
    async fn model(&self, model_id: &str) -> Result<Option<ModelRecord>, ParleyError>;

    async fn prompts(&self) -> Result<Vec<PromptRecord>, ParleyError>;
    async fn prompts_for_role(
        &self,
        role_id: &str,
    ) -> Result<Vec<PromptRecord>, ParleyError>;

    async fn roles(&self) -> Result<Vec<RoleRecord>, ParleyError>;
    async fn role(&self, role_id: &str) -> Result<Option<RoleRecord>, ParleyError>;

    async fn system_configs(&self) -> Result<Vec<SystemConfigRecord>, ParleyError>;
}
