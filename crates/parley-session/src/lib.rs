// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Game session persistence.
//!
//! Sessions serialize to JSON blobs in the KV store and survive both
//! client reconnects and process restarts. Agent state rides along as
//! JSON-safe snapshots that runtimes rebuild live agents from.

pub mod session;
pub mod store;

pub use session::{AgentSnapshot, GameSession};
pub use store::{SessionStore, DEFAULT_MAX_IDLE, DEFAULT_SESSION_TTL};
