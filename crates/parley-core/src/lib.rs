// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley game server.
//!
//! This crate provides the foundational trait seams, error types, and
//! common types used throughout the Parley workspace. Every backend
//! (kv store, model provider, config source) implements a trait defined
//! here so the rest of the workspace stays backend-agnostic.

pub mod chat;
pub mod error;
pub mod records;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use chat::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ToolCall, ToolSpec,
    DEFAULT_TEMPERATURE,
};
pub use error::ParleyError;
pub use records::{ModelRecord, PromptRecord, ProviderRecord, RoleRecord, SystemConfigRecord};
pub use traits::{ChatProvider, ChatStream, ConfigSource, KvStore};
pub use types::{
    AgentId, GameMessage, HealthStatus, MessageUsage, SessionId, TurnOutcome, TurnState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parley_error_has_all_variants() {
        let _config = ParleyError::Config("test".into());
        let _kv = ParleyError::kv(std::io::Error::other("test"));
        let _storage = ParleyError::storage(std::io::Error::other("test"));
        let _provider = ParleyError::provider("test");
        let _not_found = ParleyError::AdapterNotFound {
            kind: "provider".into(),
            name: "test".into(),
        };
        let _game = ParleyError::Game("test".into());
        let _workflow = ParleyError::Workflow("test".into());
        let _timeout = ParleyError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = ParleyError::Internal("test".into());
    }

    #[test]
    fn serde_errors_convert_via_from() {
        let bad: Result<i64, _> = serde_json::from_str("not json");
        let err: ParleyError = bad.unwrap_err().into();
        assert!(matches!(err, ParleyError::Serde(_)));
    }

    #[test]
    fn error_display_includes_context() {
        let err = ParleyError::AdapterNotFound {
            kind: "provider".into(),
            name: "claude".into(),
        };
        assert_eq!(err.to_string(), "adapter not found: provider/claude");
    }

    #[test]
    fn all_trait_seams_are_exported() {
        // Compile-time check that every seam stays object-safe.
        fn _assert_kv(_: &dyn KvStore) {}
        fn _assert_provider(_: &dyn ChatProvider) {}
        fn _assert_config(_: &dyn ConfigSource) {}
    }
}
