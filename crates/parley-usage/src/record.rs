// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage records and the persistence seam for them.
//!
//! Every LLM call produces one [`UsageRecord`], including calls that came
//! back error-shaped (those carry zero tokens). Recording is best-effort:
//! an accounting failure must never fail the chat that triggered it.

use async_trait::async_trait;
use parley_core::chat::ChatMessage;
use parley_core::ParleyError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Scenario stamped on records that carry no explicit one.
pub const DEFAULT_SCENARIO: &str = "base";

/// The request that produced a usage record: messages and model params.
///
/// Persisted alongside the record so spend can be audited back to the
/// exact prompt. Retention is the operator's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallContext {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A single usage record representing one LLM API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// Session that triggered this call, if any.
    pub session_id: Option<String>,
    /// What kind of call this was (e.g. `game-chat`, `base-function_call`).
    #[serde(default = "default_scenario")]
    pub application_scenario: String,
    /// Model identifier used.
    pub model_id: String,
    /// Provider the model belongs to.
    pub provider_id: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Calculated price for this call.
    pub price: Decimal,
    /// Wall-clock duration of the call in milliseconds.
    pub elapsed_ms: u64,
    /// ISO 8601 timestamp.
    pub created_at: String,
    /// The originating request, when the caller captured it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<CallContext>,
}

fn default_scenario() -> String {
    DEFAULT_SCENARIO.to_string()
}

impl UsageRecord {
    pub fn new(
        session_id: Option<String>,
        model_id: String,
        provider_id: i64,
        input_tokens: i64,
        output_tokens: i64,
        price: Decimal,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            application_scenario: default_scenario(),
            model_id,
            provider_id,
            input_tokens,
            output_tokens,
            price,
            elapsed_ms,
            created_at: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            context: None,
        }
    }

    /// Replaces the default scenario tag.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.application_scenario = scenario.into();
        self
    }

    /// Attaches the originating request.
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Persistence seam for usage accounting.
///
/// Implementations append the record, add the token counts to the model's
/// running counters, and accrue the price onto the provider's total.
#[async_trait]
pub trait UsageSink: Send + Sync + 'static {
    async fn record_usage(&self, record: &UsageRecord) -> Result<(), ParleyError>;
}

/// Records usage, logging instead of propagating on failure.
pub async fn record_best_effort(sink: &dyn UsageSink, record: UsageRecord) {
    if let Err(e) = sink.record_usage(&record).await {
        warn!(
            model_id = %record.model_id,
            session_id = ?record.session_id,
            error = %e,
            "failed to record usage, continuing"
        );
    }
}
