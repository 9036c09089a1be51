// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`ConfigSource`] with seedable tables.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use parley_core::records::{
    ModelRecord, PromptRecord, ProviderRecord, RoleRecord, SystemConfigRecord,
};
use parley_core::{ConfigSource, ParleyError};

/// A fake relational source holding its tables in memory.
///
/// Tracks how many calls it has served so cache tests can assert on
/// read-through behavior.
#[derive(Default)]
pub struct FakeConfigSource {
    pub providers: Mutex<Vec<ProviderRecord>>,
    pub models: Mutex<Vec<ModelRecord>>,
    pub prompts: Mutex<Vec<PromptRecord>>,
    pub roles: Mutex<Vec<RoleRecord>>,
    pub system: Mutex<Vec<SystemConfigRecord>>,
    calls: Mutex<u64>,
}

impl FakeConfigSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A source pre-seeded with one provider, one model, and one role,
    /// wired together so `model_with_provider` resolves.
    pub async fn seeded() -> Arc<Self> {
        let source = Self::new();
        source.providers.lock().await.push(sample_provider(1));
        source.models.lock().await.push(sample_model("mock-model", 1));
        source.roles.lock().await.push(sample_role("npc"));
        source
    }

    pub async fn call_count(&self) -> u64 {
        *self.calls.lock().await
    }

    async fn bump(&self) {
        *self.calls.lock().await += 1;
    }
}

pub fn sample_provider(id: i64) -> ProviderRecord {
    ProviderRecord {
        id,
        provider_name: format!("provider-{id}"),
        api_key: "test-key".into(),
        base_url: "http://localhost:0".into(),
        model_name: "mock-model".into(),
        provider_sign: "openai".into(),
        status: true,
        total_price: dec!(0),
    }
}

pub fn sample_model(model_id: &str, provider_id: i64) -> ModelRecord {
    ModelRecord {
        model_id: model_id.into(),
        provider_id,
        display_name: model_id.into(),
        input_price: dec!(0.002),
        output_price: dec!(0.006),
        status: true,
        input_tokens: 0,
        output_tokens: 0,
    }
}

pub fn sample_role(role_id: &str) -> RoleRecord {
    RoleRecord {
        role_id: role_id.into(),
        name: format!("Role {role_id}"),
        setting: Some("A helpful character".into()),
        voice: None,
        model_id: None,
        status: true,
        extras: serde_json::Map::new(),
    }
}

pub fn sample_prompt(role_id: &str, level: f64, text: &str) -> PromptRecord {
    PromptRecord {
        id: level as i64,
        role_id: role_id.into(),
        level,
        prompt_text: text.into(),
        prompt_type: "system".into(),
        status: true,
    }
}

#[async_trait]
impl ConfigSource for FakeConfigSource {
    async fn providers(&self) -> Result<Vec<ProviderRecord>, ParleyError> {
        self.bump().await;
        Ok(self.providers.lock().await.clone())
    }

    async fn provider(&self, id: i64) -> Result<Option<ProviderRecord>, ParleyError> {
        self.bump().await;
        Ok(self
            .providers
            .lock()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn models(&self) -> Result<Vec<ModelRecord>, ParleyError> {
        self.bump().await;
        Ok(self.models.lock().await.clone())
    }

    async fn model(&self, model_id: &str) -> Result<Option<ModelRecord>, ParleyError> {
        self.bump().await;
        Ok(self
            .models
            .lock()
            .await
            .iter()
            .find(|m| m.model_id == model_id)
            .cloned())
    }

    async fn prompts(&self) -> Result<Vec<PromptRecord>, ParleyError> {
        self.bump().await;
        Ok(self.prompts.lock().await.clone())
    }

    async fn prompts_for_role(
        &self,
        role_id: &str,
    ) -> Result<Vec<PromptRecord>, ParleyError> {
        self.bump().await;
        Ok(self
            .prompts
            .lock()
            .await
            .iter()
            .filter(|p| p.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn roles(&self) -> Result<Vec<RoleRecord>, ParleyError> {
        self.bump().await;
        Ok(self.roles.lock().await.clone())
    }

    async fn role(&self, role_id: &str) -> Result<Option<RoleRecord>, ParleyError> {
        self.bump().await;
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|r| r.role_id == role_id)
            .cloned())
    }

    async fn system_configs(&self) -> Result<Vec<SystemConfigRecord>, ParleyError> {
        self.bump().await;
        Ok(self.system.lock().await.clone())
    }
}
