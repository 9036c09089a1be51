// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the Parley components.
//!
//! Every backend (kv, provider, config source) is reached through one of
//! these `#[async_trait]` traits so tests can swap in in-memory fakes.

pub mod config;
pub mod kv;
pub mod provider;

pub use config::ConfigSource;
pub use kv::KvStore;
pub use provider::{ChatProvider, ChatStream};
