// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter construction and caching.
//!
//! The catalog's provider records carry a `provider_sign` naming the wire
//! family they speak. Claude-family providers get a [`ClaudeAdapter`];
//! everything else is assumed OpenAI-compatible, which covers OpenAI
//! itself and gateways like Doubao and DeepSeek.

use std::sync::Arc;

use dashmap::DashMap;
use parley_catalog::CatalogManager;
use parley_claude::ClaudeAdapter;
use parley_core::records::{ModelRecord, ProviderRecord};
use parley_core::traits::ChatProvider;
use parley_core::ParleyError;
use parley_openai::OpenAiAdapter;
use parley_usage::UsageSink;
use tracing::debug;

use crate::accounting::AccountedProvider;

/// Builds and caches one accounted provider per model.
pub struct AdapterFactory {
    catalog: Arc<CatalogManager>,
    sink: Arc<dyn UsageSink>,
    instances: DashMap<String, AccountedProvider>,
}

impl AdapterFactory {
    pub fn new(catalog: Arc<CatalogManager>, sink: Arc<dyn UsageSink>) -> Self {
        Self {
            catalog,
            sink,
            instances: DashMap::new(),
        }
    }

    /// Returns the accounted provider for a model, building it on first use.
    pub async fn provider_for_model(
        &self,
        model_id: &str,
    ) -> Result<AccountedProvider, ParleyError> {
        if let Some(instance) = self.instances.get(model_id) {
            return Ok(instance.clone());
        }

        let (model, provider) = self
            .catalog
            .model_with_provider(model_id)
            .await?
            .ok_or_else(|| ParleyError::AdapterNotFound {
                kind: "model".into(),
                name: model_id.to_string(),
            })?;
        if !provider.status {
            return Err(ParleyError::AdapterNotFound {
                kind: "provider".into(),
                name: provider.provider_name,
            });
        }

        let adapter = build_adapter(&provider, &model)?;
        debug!(
            model_id = %model.model_id,
            provider = %provider.provider_name,
            sign = %provider.provider_sign,
            "built provider adapter"
        );
        let accounted = AccountedProvider::new(adapter, model, self.sink.clone());
        self.instances
            .insert(model_id.to_string(), accounted.clone());
        Ok(accounted)
    }

    /// Drops a cached instance, forcing a rebuild on next use. Called when
    /// provider credentials or model pricing change.
    pub fn invalidate(&self, model_id: &str) {
        self.instances.remove(model_id);
    }
}

fn build_adapter(
    provider: &ProviderRecord,
    model: &ModelRecord,
) -> Result<Arc<dyn ChatProvider>, ParleyError> {
    let adapter: Arc<dyn ChatProvider> = match provider.provider_sign.to_lowercase().as_str() {
        "claude" | "anthropic" => Arc::new(ClaudeAdapter::from_credentials(
            &provider.api_key,
            &provider.base_url,
            &model.model_id,
        )?),
        _ => Arc::new(OpenAiAdapter::from_credentials(
            &provider.api_key,
            &provider.base_url,
            &model.model_id,
        )?),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_catalog::CacheFlags;
    use parley_core::traits::ChatProvider;
    use parley_test_utils::{memory_store, sample_model, sample_provider, FakeConfigSource};
    use parley_usage::UsageRecord;

    struct NullSink;

    #[async_trait]
    impl UsageSink for NullSink {
        async fn record_usage(&self, _record: &UsageRecord) -> Result<(), ParleyError> {
            Ok(())
        }
    }

    async fn factory_with(source: FakeConfigSource) -> AdapterFactory {
        let catalog = CatalogManager::new(
            memory_store(),
            "test:",
            Arc::new(source),
            CacheFlags::default(),
        );
        AdapterFactory::new(Arc::new(catalog), Arc::new(NullSink))
    }

    #[tokio::test]
    async fn builds_openai_family_adapter() {
        let source = FakeConfigSource::default();
        source.providers.lock().await.push(sample_provider(1));
        source
            .models
            .lock()
            .await
            .push(sample_model("gpt-4o", 1));

        let factory = factory_with(source).await;
        let provider = factory.provider_for_model("gpt-4o").await.unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn builds_claude_family_adapter() {
        let source = FakeConfigSource::default();
        let mut record = sample_provider(2);
        record.provider_sign = "claude".into();
        source.providers.lock().await.push(record);
        source
            .models
            .lock()
            .await
            .push(sample_model("claude-sonnet-4-20250514", 2));

        let factory = factory_with(source).await;
        let provider = factory
            .provider_for_model("claude-sonnet-4-20250514")
            .await
            .unwrap();
        assert_eq!(provider.provider_name(), "claude");
    }

    #[tokio::test]
    async fn unknown_model_is_adapter_not_found() {
        let factory = factory_with(FakeConfigSource::default()).await;
        let err = factory.provider_for_model("missing").await.unwrap_err();
        assert!(matches!(err, ParleyError::AdapterNotFound { .. }));
    }

    #[tokio::test]
    async fn disabled_provider_is_rejected() {
        let source = FakeConfigSource::default();
        let mut record = sample_provider(3);
        record.status = false;
        source.providers.lock().await.push(record);
        source
            .models
            .lock()
            .await
            .push(sample_model("gpt-4o", 3));

        let factory = factory_with(source).await;
        let err = factory.provider_for_model("gpt-4o").await.unwrap_err();
        assert!(matches!(
            err,
            ParleyError::AdapterNotFound { ref kind, .. } if kind == "provider"
        ));
    }

    #[tokio::test]
    async fn instances_are_cached_until_invalidated() {
        let source = FakeConfigSource::default();
        source.providers.lock().await.push(sample_provider(1));
        source
            .models
            .lock()
            .await
            .push(sample_model("gpt-4o", 1));

        let factory = factory_with(source).await;
        factory.provider_for_model("gpt-4o").await.unwrap();
        assert_eq!(factory.instances.len(), 1);
        factory.provider_for_model("gpt-4o").await.unwrap();
        assert_eq!(factory.instances.len(), 1);

        factory.invalidate("gpt-4o");
        assert!(factory.instances.is_empty());
    }
}
