// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider seam for LLM vendor integrations.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::chat::{ChatChunk, ChatRequest, ChatResponse, ToolSpec};
use crate::error::ParleyError;
use crate::types::HealthStatus;

/// A stream of response chunks from a provider.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ParleyError>> + Send>>;

/// Uniform contract every model backend fulfils.
///
/// Implementations handle one wire family each; the adapter layer above
/// adds message hygiene, error shaping, and usage accounting.
#[async_trait]
pub trait ChatProvider: Send + Sync + 'static {
    /// Short vendor family name (`openai`, `claude`, ...).
    fn provider_name(&self) -> &str;

    /// Model this instance is bound to (requests may override it).
    fn model(&self) -> &str;

    /// Sends a chat request and returns the full response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError>;

    /// Sends a chat request and returns a stream of response chunks.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ParleyError>;

    /// Sends a chat request with tool definitions attached.
    ///
    /// The response's `tool_calls` carries the model's invocations, if any.
    async fn function_call(
        &self,
        request: ChatRequest,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ParleyError>;

    /// Probes the backend's reachability.
    async fn health_check(&self) -> Result<HealthStatus, ParleyError>;
}
