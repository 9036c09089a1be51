// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley game server.

use thiserror::Error;

/// The primary error type used across all Parley trait seams and core operations.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Key-value backend errors (connection failure, command failure).
    #[error("kv error: {source}")]
    Kv {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Relational storage errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, token limits, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Requested adapter was not found in a registry.
    #[error("adapter not found: {kind}/{name}")]
    AdapterNotFound { kind: String, name: String },

    /// Game runtime errors (missing session, rule violations, agent setup).
    #[error("game error: {0}")]
    Game(String),

    /// Workflow engine errors (bad graph, unknown node, resolution failure).
    #[error("workflow error: {0}")]
    Workflow(String),

    /// JSON serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Wraps an arbitrary error as a kv backend failure.
    pub fn kv<E: std::error::Error + Send + Sync + 'static>(source: E) -> Self {
        ParleyError::Kv {
            source: Box::new(source),
        }
    }

    /// Wraps an arbitrary error as a storage failure.
    pub fn storage<E: std::error::Error + Send + Sync + 'static>(source: E) -> Self {
        ParleyError::Storage {
            source: Box::new(source),
        }
    }

    /// Builds a provider failure from a message only.
    pub fn provider(message: impl Into<String>) -> Self {
        ParleyError::Provider {
            message: message.into(),
            source: None,
        }
    }
}
