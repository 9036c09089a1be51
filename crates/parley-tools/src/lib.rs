// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry for game agents.
//!
//! Game runtimes register their tools here; the registry exports
//! provider-format specs and executes a model's tool call batch with
//! per-call error isolation.

pub mod tool;

pub use tool::{Tool, ToolOutput, ToolRegistry};
