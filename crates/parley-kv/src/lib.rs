// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value layer for the Parley game server.
//!
//! [`RedisStore`] is the production backend; [`MemoryStore`] serves tests
//! and single-process local runs. [`KvCache`] adds key namespacing and a
//! JSON codec on top of either.

pub mod cache;
pub mod memory;
pub mod redis;

pub use cache::{DEFAULT_PREFIX, KvCache};
pub use memory::MemoryStore;
pub use redis::{RedisSettings, RedisStore};
