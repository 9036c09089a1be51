// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claude Messages API integration.
//!
//! Exposes [`ClaudeClient`] for raw wire access and [`ClaudeAdapter`],
//! which implements the workspace-wide `ChatProvider` trait on top of it.

pub mod adapter;
pub mod client;
pub mod sse;
pub mod types;

pub use adapter::ClaudeAdapter;
pub use client::{ClaudeClient, DEFAULT_API_VERSION};
pub use sse::StreamEvent;
pub use types::{MessageRequest, MessageResponse, DEFAULT_MAX_TOKENS};
