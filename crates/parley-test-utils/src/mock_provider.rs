// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider for deterministic testing.
//!
//! `MockProvider` implements `ChatProvider` with pre-configured responses,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use parley_core::chat::{ChatChunk, ChatRequest, ChatResponse, ToolCall, ToolSpec};
use parley_core::traits::provider::{ChatProvider, ChatStream};
use parley_core::types::HealthStatus;
use parley_core::ParleyError;

/// One scripted reply: plain text, tool calls, or a hard failure.
#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Failure(String),
}

/// A mock provider that pops replies from a FIFO queue.
///
/// When the queue runs dry, a default "mock response" text is returned.
/// Every request is captured for later assertions.
pub struct MockProvider {
    model: String,
    replies: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_model("mock-model")
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        MockProvider {
            model: model.into(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_replies(replies: Vec<Scripted>) -> Self {
        MockProvider {
            model: "mock-model".into(),
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push_text(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(Scripted::Text(text.into()));
    }

    pub async fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        self.replies
            .lock()
            .await
            .push_back(Scripted::ToolCalls(vec![ToolCall {
                id: format!("call-{}", uuid::Uuid::new_v4()),
                name: name.into(),
                arguments: arguments.to_string(),
            }]));
    }

    /// Queues a reply whose tool result list is empty, for retry tests.
    pub async fn push_empty_tool_result(&self) {
        self.replies
            .lock()
            .await
            .push_back(Scripted::ToolCalls(Vec::new()));
    }

    pub async fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(Scripted::Failure(message.into()));
    }

    /// Requests seen so far, in call order.
    pub async fn captured_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_reply(&self) -> Scripted {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Scripted::Text("mock response".into()))
    }

    fn respond(&self, reply: Scripted) -> Result<ChatResponse, ParleyError> {
        match reply {
            Scripted::Text(text) => Ok(ChatResponse {
                id: format!("mock-{}", uuid::Uuid::new_v4()),
                model: self.model.clone(),
                content: text,
                role: "assistant".into(),
                finish_reason: "stop".into(),
                input_tokens: 10,
                output_tokens: 20,
                total_tokens: 30,
                elapsed_ms: 1,
                price: None,
                tool_calls: Vec::new(),
            }),
            Scripted::ToolCalls(tool_calls) => Ok(ChatResponse {
                id: format!("mock-{}", uuid::Uuid::new_v4()),
                model: self.model.clone(),
                content: String::new(),
                role: "assistant".into(),
                finish_reason: "tool_calls".into(),
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
                elapsed_ms: 1,
                price: None,
                tool_calls,
            }),
            Scripted::Failure(message) => Err(ParleyError::provider(message)),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError> {
        self.requests.lock().await.push(request);
        let reply = self.next_reply().await;
        self.respond(reply)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ParleyError> {
        self.requests.lock().await.push(request);
        let reply = self.next_reply().await;
        let response = self.respond(reply)?;

        // One chunk per word, then a terminal chunk with the totals.
        let mut chunks: Vec<Result<ChatChunk, ParleyError>> = response
            .content
            .split_inclusive(' ')
            .map(|word| {
                Ok(ChatChunk {
                    id: response.id.clone(),
                    model: response.model.clone(),
                    delta: word.to_string(),
                    finish_reason: None,
                    input_tokens: 0,
                    output_tokens: 0,
                })
            })
            .collect();
        chunks.push(Ok(ChatChunk {
            id: response.id.clone(),
            model: response.model.clone(),
            delta: String::new(),
            finish_reason: Some("stop".into()),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        }));
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn function_call(
        &self,
        request: ChatRequest,
        _tools: &[ToolSpec],
    ) -> Result<ChatResponse, ParleyError> {
        self.requests.lock().await.push(request);
        let reply = self.next_reply().await;
        self.respond(reply)
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }
}
