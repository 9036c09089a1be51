// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog entity records served by [`crate::traits::ConfigSource`]
//! implementations and cached by the catalog layer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An LLM provider account (vendor endpoint plus credentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: i64,
    pub provider_name: String,
    pub api_key: String,
    pub base_url: String,
    /// Default model served through this provider.
    pub model_name: String,
    /// Wire family selector (`openai`, `claude`, ...).
    pub provider_sign: String,
    pub status: bool,
    /// Accrued spend across all recorded calls.
    pub total_price: Decimal,
}

/// A priced model row, keyed by the vendor model id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: String,
    pub provider_id: i64,
    pub display_name: String,
    /// Price per 1K input tokens.
    pub input_price: Decimal,
    /// Price per 1K output tokens.
    pub output_price: Decimal,
    pub status: bool,
    /// Lifetime token counters, bumped by usage accounting.
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// A prompt template bound to a role at a given level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: i64,
    pub role_id: String,
    pub level: f64,
    pub prompt_text: String,
    pub prompt_type: String,
    pub status: bool,
}

/// A playable character role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    pub role_id: String,
    pub name: String,
    #[serde(default)]
    pub setting: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    /// Preferred model for this role; falls back to the game default.
    #[serde(default)]
    pub model_id: Option<String>,
    pub status: bool,
    /// Free-form extras carried through to clients.
    #[serde(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// A key-value system configuration row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfigRecord {
    pub key: String,
    pub value: String,
}
