// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat completion integration.
//!
//! Exposes [`OpenAiClient`] for raw wire access and [`OpenAiAdapter`],
//! which implements the workspace-wide `ChatProvider` trait on top of it.
//! Any OpenAI-compatible gateway (Doubao, DeepSeek, vLLM) works through
//! the same adapter with a different base URL.

pub mod adapter;
pub mod client;
pub mod sse;
pub mod types;

pub use adapter::OpenAiAdapter;
pub use client::OpenAiClient;
pub use types::{ChatCompletionRequest, ChatCompletionResponse};
