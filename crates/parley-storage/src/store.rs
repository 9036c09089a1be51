// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed implementations of the ConfigSource and UsageSink seams.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use parley_core::records::{
    ModelRecord, PromptRecord, ProviderRecord, RoleRecord, SystemConfigRecord,
};
use parley_core::{ConfigSource, ParleyError};
use parley_usage::{UsageRecord, UsageSink};

use crate::database::Database;
use crate::queries;

/// Relational fallback behind the catalog caches, plus the usage ledger.
///
/// One handle serves both seams so the ledger can fold token counters and
/// accrued spend back into the same catalog tables the caches read from.
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    /// Open (or create) the store at the given file path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ParleyError> {
        let db = Database::open(path).await?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory store with the full schema applied.
    pub async fn open_in_memory() -> Result<Self, ParleyError> {
        let db = Database::open_in_memory().await?;
        Ok(Self { db: Arc::new(db) })
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Verify the store answers a trivial query.
    pub async fn ping(&self) -> Result<(), ParleyError> {
        self.db.ping().await
    }

    pub async fn insert_provider(&self, record: &ProviderRecord) -> Result<(), ParleyError> {
        queries::catalog::insert_provider(&self.db, record).await
    }

    pub async fn insert_model(&self, record: &ModelRecord) -> Result<(), ParleyError> {
        queries::catalog::insert_model(&self.db, record).await
    }

    pub async fn insert_role(&self, record: &RoleRecord) -> Result<(), ParleyError> {
        queries::catalog::insert_role(&self.db, record).await
    }

    pub async fn insert_prompt(&self, record: &PromptRecord) -> Result<(), ParleyError> {
        queries::catalog::insert_prompt(&self.db, record).await
    }

    pub async fn set_system_config(&self, key: &str, value: &str) -> Result<(), ParleyError> {
        queries::catalog::set_system_config(&self.db, key, value).await
    }

    /// Total spend recorded for one session.
    pub async fn session_total(
        &self,
        session_id: &str,
    ) -> Result<rust_decimal::Decimal, ParleyError> {
        queries::usage::session_total(&self.db, session_id).await
    }
}

#[async_trait]
impl ConfigSource for SqliteStore {
    async fn providers(&self) -> Result<Vec<ProviderRecord>, ParleyError> {
        queries::catalog::list_providers(&self.db).await
    }

    async fn provider(&self, id: i64) -> Result<Option<ProviderRecord>, ParleyError> {
        queries::catalog::get_provider(&self.db, id).await
    }

    async fn models(&self) -> Result<Vec<ModelRecord>, ParleyError> {
        queries::catalog::list_models(&self.db).await
    }

    async fn model(&self, model_id: &str) -> Result<Option<ModelRecord>, ParleyError> {
        queries::catalog::get_model(&self.db, model_id).await
    }

    async fn prompts(&self) -> Result<Vec<PromptRecord>, ParleyError> {
        queries::catalog::list_prompts(&self.db).await
    }

    async fn prompts_for_role(&self, role_id: &str) -> Result<Vec<PromptRecord>, ParleyError> {
        queries::catalog::prompts_for_role(&self.db, role_id).await
    }

    async fn roles(&self) -> Result<Vec<RoleRecord>, ParleyError> {
        queries::catalog::list_roles(&self.db).await
    }

    async fn role(&self, role_id: &str) -> Result<Option<RoleRecord>, ParleyError> {
        queries::catalog::get_role(&self.db, role_id).await
    }

    async fn system_configs(&self) -> Result<Vec<SystemConfigRecord>, ParleyError> {
        queries::catalog::list_system_configs(&self.db).await
    }
}

#[async_trait]
impl UsageSink for SqliteStore {
    async fn record_usage(&self, record: &UsageRecord) -> Result<(), ParleyError> {
        queries::usage::insert_record(&self.db, record).await?;
        info!(
            model_id = %record.model_id,
            session_id = ?record.session_id,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            price = %record.price,
            "usage recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_test_utils::{sample_model, sample_prompt, sample_provider, sample_role};
    use rust_decimal_macros::dec;
    use serial_test::serial;

    async fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.insert_provider(&sample_provider(1)).await.unwrap();
        store
            .insert_model(&sample_model("mock-model", 1))
            .await
            .unwrap();
        store.insert_role(&sample_role("npc")).await.unwrap();
        store
            .insert_prompt(&sample_prompt("npc", 1.0, "You are a villager."))
            .await
            .unwrap();
        store
            .insert_prompt(&sample_prompt("npc", 5.0, "You are a seasoned villager."))
            .await
            .unwrap();
        store
    }

    fn usage(session_id: &str, price: rust_decimal::Decimal) -> UsageRecord {
        UsageRecord::new(
            Some(session_id.to_string()),
            "mock-model".into(),
            1,
            1000,
            500,
            price,
            42,
        )
    }

    #[tokio::test]
    async fn round_trips_catalog_records() {
        let store = seeded_store().await;

        let provider = store.provider(1).await.unwrap().unwrap();
        assert_eq!(provider.provider_name, "provider-1");
        assert_eq!(provider.total_price, dec!(0));
        assert!(store.provider(99).await.unwrap().is_none());

        let model = store.model("mock-model").await.unwrap().unwrap();
        assert_eq!(model.provider_id, 1);
        assert_eq!(model.input_price, dec!(0.002));

        let role = store.role("npc").await.unwrap().unwrap();
        assert_eq!(role.name, "Role npc");
        assert!(role.extras.is_empty());

        let prompts = store.prompts_for_role("npc").await.unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].level, 1.0);
        assert_eq!(prompts[1].level, 5.0);
    }

    #[tokio::test]
    async fn system_config_upserts() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.set_system_config("game.lang", "en").await.unwrap();
        store.set_system_config("game.lang", "zh").await.unwrap();
        let configs = store.system_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].value, "zh");
    }

    #[tokio::test]
    async fn role_extras_survive_json_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let mut role = sample_role("bard");
        role.extras
            .insert("avatar".into(), serde_json::json!("bard.png"));
        store.insert_role(&role).await.unwrap();

        let loaded = store.role("bard").await.unwrap().unwrap();
        assert_eq!(loaded.extras["avatar"], serde_json::json!("bard.png"));
    }

    #[tokio::test]
    async fn usage_updates_counters_and_provider_spend() {
        let store = seeded_store().await;

        store
            .record_usage(&usage("sess-1", dec!(0.005)))
            .await
            .unwrap();
        store
            .record_usage(&usage("sess-1", dec!(0.0025)))
            .await
            .unwrap();
        store
            .record_usage(&usage("sess-2", dec!(0.001)))
            .await
            .unwrap();

        let model = store.model("mock-model").await.unwrap().unwrap();
        assert_eq!(model.input_tokens, 3000);
        assert_eq!(model.output_tokens, 1500);

        let provider = store.provider(1).await.unwrap().unwrap();
        assert_eq!(provider.total_price, dec!(0.0085));

        assert_eq!(store.session_total("sess-1").await.unwrap(), dec!(0.0075));
        assert_eq!(store.session_total("sess-9").await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn usage_context_row_lands_with_the_record() {
        let store = seeded_store().await;
        let record = usage("sess-ctx", dec!(0.001))
            .with_scenario("game-chat")
            .with_context(parley_usage::CallContext {
                messages: vec![parley_core::chat::ChatMessage::user("whose soup is it")],
                temperature: Some(0.7),
                max_tokens: Some(512),
            });
        store.record_usage(&record).await.unwrap();

        let (messages, model_params) =
            queries::usage::record_context(store.database(), &record.id)
                .await
                .unwrap()
                .unwrap();
        assert!(messages.contains("whose soup is it"));
        assert!(model_params.contains("512"));

        // A context-less record writes no context row.
        let bare = usage("sess-ctx", dec!(0.001));
        store.record_usage(&bare).await.unwrap();
        assert!(queries::usage::record_context(store.database(), &bare.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn usage_for_unknown_model_still_lands_in_ledger() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let record = UsageRecord::new(None, "ghost-model".into(), 7, 10, 5, dec!(0), 3);
        store.record_usage(&record).await.unwrap();
        assert_eq!(
            queries::usage::model_record_count(store.database(), "ghost-model")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    #[serial]
    async fn reopens_file_database_with_data_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.insert_provider(&sample_provider(1)).await.unwrap();
            store.database().close().await.unwrap();
        }

        let store = SqliteStore::open(&path).await.unwrap();
        let providers = store.providers().await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].id, 1);
    }
}
