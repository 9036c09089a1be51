// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mocks and fakes for fast, deterministic, CI-runnable tests
//! without Redis or vendor APIs.
//!
//! # Components
//!
//! - [`MockProvider`] - scripted `ChatProvider` with request capture
//! - [`FakeConfigSource`] - in-memory relational source with seed helpers
//! - [`memory_store`] - fresh in-process kv store

use std::sync::Arc;

use parley_core::KvStore;
use parley_kv::MemoryStore;

pub mod fake_source;
pub mod mock_provider;

pub use fake_source::{
    sample_model, sample_prompt, sample_provider, sample_role, FakeConfigSource,
};
pub use mock_provider::{MockProvider, Scripted};

/// A fresh in-memory kv store as the trait object most APIs take.
pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryStore::new())
}
