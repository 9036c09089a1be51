// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached catalog of providers, models, prompts, roles, and system
//! configuration.
//!
//! Each cache keeps a collection key with the full table plus per-entity
//! point keys, reads through to the relational [`ConfigSource`] on a miss
//! (writing the result back), and can be disabled to bypass the kv layer
//! entirely. The prompt cache adds a sorted-set index for
//! nearest-level-at-or-below lookup.

pub mod manager;
pub mod model_cache;
pub mod prompt_cache;
pub mod provider_cache;
pub mod role_cache;
pub mod system_cache;

pub use manager::{CacheFlags, CatalogManager};
pub use model_cache::ModelCache;
pub use prompt_cache::PromptCache;
pub use provider_cache::ProviderCache;
pub use role_cache::RoleCache;
pub use system_cache::SystemConfigCache;
