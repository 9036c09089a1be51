// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ChatProvider`] implementation backed by the Claude Messages API.

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::chat::{ChatChunk, ChatMessage, ChatRequest, ChatResponse, ToolCall, ToolSpec};
use parley_core::traits::{ChatProvider, ChatStream};
use parley_core::{HealthStatus, ParleyError};
use tracing::debug;

use crate::client::ClaudeClient;
use crate::sse::StreamEvent;
use crate::types::{
    ApiContent, ApiContentBlock, ApiMessage, MessageRequest, MessageResponse,
    ResponseContentBlock, SseDelta, ToolDefinition, DEFAULT_MAX_TOKENS,
};

/// Chat adapter speaking the Claude Messages wire format.
pub struct ClaudeAdapter {
    client: ClaudeClient,
}

impl ClaudeAdapter {
    pub fn new(client: ClaudeClient) -> Self {
        Self { client }
    }

    /// Builds an adapter from provider credentials. An empty `base_url`
    /// keeps the default API origin.
    pub fn from_credentials(
        api_key: &str,
        base_url: &str,
        model: &str,
    ) -> Result<Self, ParleyError> {
        let mut client = ClaudeClient::new(
            api_key.to_string(),
            crate::client::DEFAULT_API_VERSION.to_string(),
            model.to_string(),
        )?;
        if !base_url.is_empty() {
            client = client.with_base_url(base_url.to_string());
        }
        Ok(Self { client })
    }

    fn build_request(&self, request: &ChatRequest, tools: Option<&[ToolSpec]>) -> MessageRequest {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role.as_str() {
                "system" => system_parts.push(msg.content.clone()),
                "assistant" if !msg.tool_calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ApiContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for call in &msg.tool_calls {
                        blocks.push(ApiContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: serde_json::from_str(&call.arguments)
                                .unwrap_or(serde_json::Value::Object(Default::default())),
                        });
                    }
                    messages.push(ApiMessage {
                        role: "assistant".into(),
                        content: ApiContent::Blocks(blocks),
                    });
                }
                // Tool results travel as user-side content blocks.
                "tool" => messages.push(ApiMessage {
                    role: "user".into(),
                    content: ApiContent::Blocks(vec![ApiContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: None,
                    }]),
                }),
                role => messages.push(ApiMessage {
                    role: role.to_string(),
                    content: ApiContent::Text(msg.content.clone()),
                }),
            }
        }

        MessageRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.client.default_model().to_string()),
            messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: Some(request.effective_temperature()),
            stream: false,
            tools: tools.map(|specs| {
                specs
                    .iter()
                    .map(|spec| ToolDefinition {
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        input_schema: spec.parameters.clone(),
                    })
                    .collect()
            }),
        }
    }

    fn convert_response(response: MessageResponse, elapsed_ms: u64) -> ChatResponse {
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ResponseContentBlock::Text { text } => text_parts.push(text),
                ResponseContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
            }
        }

        let input_tokens = i64::from(response.usage.input_tokens);
        let output_tokens = i64::from(response.usage.output_tokens);
        ChatResponse {
            id: response.id,
            model: response.model,
            content: text_parts.join(""),
            role: response.role,
            finish_reason: map_stop_reason(response.stop_reason.as_deref()),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            elapsed_ms,
            price: None,
            tool_calls,
        }
    }
}

fn map_stop_reason(stop_reason: Option<&str>) -> String {
    match stop_reason {
        Some("end_turn") | None => "stop".into(),
        Some("tool_use") => "tool_calls".into(),
        Some("max_tokens") => "length".into(),
        Some(other) => other.to_string(),
    }
}

#[derive(Default)]
struct StreamState {
    id: String,
    model: String,
    input_tokens: i64,
}

#[async_trait]
impl ChatProvider for ClaudeAdapter {
    fn provider_name(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        self.client.default_model()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError> {
        let api_request = self.build_request(&request, None);
        let started = Instant::now();
        let response = self.client.complete_message(&api_request).await?;
        debug!(id = %response.id, "chat completion received");
        Ok(Self::convert_response(
            response,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ParleyError> {
        let api_request = self.build_request(&request, None);
        let events = self.client.stream_message(&api_request).await?;

        let stream = events
            .scan(StreamState::default(), |state, event| {
                let item = match event {
                    Ok(StreamEvent::MessageStart(start)) => {
                        state.id = start.message.id;
                        state.model = start.message.model;
                        state.input_tokens = i64::from(start.message.usage.input_tokens);
                        None
                    }
                    Ok(StreamEvent::ContentBlockDelta(block)) => match block.delta {
                        SseDelta::TextDelta { text } => Some(Ok(ChatChunk {
                            id: state.id.clone(),
                            model: state.model.clone(),
                            delta: text,
                            finish_reason: None,
                            input_tokens: 0,
                            output_tokens: 0,
                        })),
                        SseDelta::InputJsonDelta { .. } => None,
                    },
                    Ok(StreamEvent::MessageDelta(delta)) => {
                        let output_tokens = delta
                            .usage
                            .map(|u| i64::from(u.output_tokens))
                            .unwrap_or_default();
                        Some(Ok(ChatChunk {
                            id: state.id.clone(),
                            model: state.model.clone(),
                            delta: String::new(),
                            finish_reason: Some(map_stop_reason(
                                delta.delta.stop_reason.as_deref(),
                            )),
                            input_tokens: state.input_tokens,
                            output_tokens,
                        }))
                    }
                    Ok(StreamEvent::MessageStop) | Ok(StreamEvent::Ping) => None,
                    Ok(StreamEvent::Error(err)) => Some(Err(ParleyError::Provider {
                        message: format!(
                            "Claude stream error ({}): {}",
                            err.error.type_, err.error.message
                        ),
                        source: None,
                    })),
                    Err(e) => Some(Err(e)),
                };
                futures::future::ready(Some(item))
            })
            .filter_map(futures::future::ready);

        Ok(Box::pin(stream))
    }

    async fn function_call(
        &self,
        request: ChatRequest,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ParleyError> {
        let api_request = self.build_request(&request, Some(tools));
        let started = Instant::now();
        let response = self.client.complete_message(&api_request).await?;
        Ok(Self::convert_response(
            response,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let probe = ChatRequest {
            messages: vec![ChatMessage::user("ping")],
            model: None,
            temperature: Some(0.0),
            max_tokens: Some(1),
        };
        let api_request = self.build_request(&probe, None);
        match self.client.complete_message(&api_request).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}
