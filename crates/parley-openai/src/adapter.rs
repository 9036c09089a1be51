// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ChatProvider`] implementation backed by the Chat Completions API.

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::chat::{ChatChunk, ChatMessage, ChatRequest, ChatResponse, ToolCall, ToolSpec};
use parley_core::traits::{ChatProvider, ChatStream};
use parley_core::{HealthStatus, ParleyError};
use tracing::debug;

use crate::client::OpenAiClient;
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, WireFunctionCall, WireFunctionDef,
    WireMessage, WireTool, WireToolCall,
};

/// Chat adapter speaking the OpenAI-compatible wire format.
pub struct OpenAiAdapter {
    client: OpenAiClient,
}

impl OpenAiAdapter {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    /// Builds an adapter from provider credentials. An empty `base_url`
    /// keeps the default API origin.
    pub fn from_credentials(
        api_key: &str,
        base_url: &str,
        model: &str,
    ) -> Result<Self, ParleyError> {
        let mut client = OpenAiClient::new(api_key.to_string(), model.to_string())?;
        if !base_url.is_empty() {
            client = client.with_base_url(base_url.to_string());
        }
        Ok(Self { client })
    }

    fn build_request(&self, request: &ChatRequest, tools: Option<&[ToolSpec]>) -> ChatCompletionRequest {
        let messages = request.messages.iter().map(convert_message).collect();

        ChatCompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.client.default_model().to_string()),
            messages,
            temperature: Some(request.effective_temperature()),
            max_tokens: request.max_tokens,
            stream: false,
            stream_options: None,
            tools: tools.map(|specs| {
                specs
                    .iter()
                    .map(|spec| WireTool {
                        type_: "function".into(),
                        function: WireFunctionDef {
                            name: spec.name.clone(),
                            description: spec.description.clone(),
                            parameters: spec.parameters.clone(),
                        },
                    })
                    .collect()
            }),
        }
    }

    fn convert_response(
        response: ChatCompletionResponse,
        elapsed_ms: u64,
    ) -> Result<ChatResponse, ParleyError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::Provider {
                message: "chat completion returned no choices".into(),
                source: None,
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        let usage = response.usage.unwrap_or_default();
        Ok(ChatResponse {
            id: response.id,
            model: response.model,
            content: choice.message.content.unwrap_or_default(),
            role: choice.message.role,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
            input_tokens: i64::from(usage.prompt_tokens),
            output_tokens: i64::from(usage.completion_tokens),
            total_tokens: i64::from(usage.total_tokens),
            elapsed_ms,
            price: None,
            tool_calls,
        })
    }
}

fn convert_message(msg: &ChatMessage) -> WireMessage {
    let tool_calls = if msg.tool_calls.is_empty() {
        None
    } else {
        Some(
            msg.tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    type_: "function".into(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    WireMessage {
        role: msg.role.clone(),
        content: if msg.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(msg.content.clone())
        },
        tool_calls,
        tool_call_id: msg.tool_call_id.clone(),
    }
}

#[derive(Default)]
struct StreamState {
    finish_reason: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAiAdapter {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        self.client.default_model()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError> {
        let api_request = self.build_request(&request, None);
        let started = Instant::now();
        let response = self.client.complete(&api_request).await?;
        debug!(id = %response.id, "chat completion received");
        Self::convert_response(response, started.elapsed().as_millis() as u64)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ParleyError> {
        let api_request = self.build_request(&request, None);
        let chunks = self.client.stream(&api_request).await?;

        // Text deltas pass through as they arrive; the usage-only chunk at
        // the end of the stream becomes the terminal chunk carrying the
        // finish_reason remembered from the last choice.
        let stream = chunks
            .scan(StreamState::default(), |state, chunk| {
                let item = match chunk {
                    Ok(chunk) => {
                        if let Some(usage) = chunk.usage {
                            Some(Ok(ChatChunk {
                                id: chunk.id,
                                model: chunk.model,
                                delta: String::new(),
                                finish_reason: Some(
                                    state.finish_reason.take().unwrap_or_else(|| "stop".into()),
                                ),
                                input_tokens: i64::from(usage.prompt_tokens),
                                output_tokens: i64::from(usage.completion_tokens),
                            }))
                        } else if let Some(choice) = chunk.choices.into_iter().next() {
                            if let Some(reason) = choice.finish_reason {
                                state.finish_reason = Some(reason);
                            }
                            choice.delta.content.map(|text| {
                                Ok(ChatChunk {
                                    id: chunk.id,
                                    model: chunk.model,
                                    delta: text,
                                    finish_reason: None,
                                    input_tokens: 0,
                                    output_tokens: 0,
                                })
                            })
                        } else {
                            None
                        }
                    }
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
        let response = self.client.complete(&api_request).await?;
        Self::convert_response(response, started.elapsed().as_millis() as u64)
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let probe = ChatRequest {
            messages: vec![ChatMessage::user("ping")],
            model: None,
            temperature: Some(0.0),
            max_tokens: Some(1),
        };
        let api_request = self.build_request(&probe, None);
        match self.client.complete(&api_request).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter_for(server: &MockServer) -> OpenAiAdapter {
        let client = OpenAiClient::new("test-key".into(), "gpt-4o".into())
            .unwrap()
            .with_base_url(server.uri());
        OpenAiAdapter::new(client)
    }

    #[tokio::test]
    async fn chat_passes_system_messages_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "You are a riddle host."},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Welcome!"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let request = ChatRequest::new(vec![
            ChatMessage::system("You are a riddle host."),
            ChatMessage::user("Hello"),
        ]);
        let response = adapter.chat(request).await.unwrap();
        assert_eq!(response.content, "Welcome!");
        assert_eq!(response.total_tokens, 16);
    }

    #[tokio::test]
    async fn function_call_maps_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{"type": "function", "function": {"name": "create_soup"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-2",
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "create_soup", "arguments": "{\"difficulty\":\"hard\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 20, "completion_tokens": 8, "total_tokens": 28}
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let tools = vec![ToolSpec {
            name: "create_soup".into(),
            description: "Creates a riddle".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let request = ChatRequest::new(vec![ChatMessage::user("make one")]);
        let response = adapter.function_call(request, &tools).await.unwrap();
        assert_eq!(response.finish_reason, "tool_calls");
        assert_eq!(response.tool_calls[0].arguments, "{\"difficulty\":\"hard\"}");
    }

    #[tokio::test]
    async fn chat_stream_emits_terminal_usage_chunk() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Once\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" upon\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":2,\"total_tokens\":11}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let request = ChatRequest::new(vec![ChatMessage::user("tell a story")]);
        let stream = adapter.chat_stream(request).await.unwrap();
        let chunks: Vec<_> = stream.collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref().unwrap().delta, "Once");
        assert_eq!(chunks[1].as_ref().unwrap().delta, " upon");
        let last = chunks[2].as_ref().unwrap();
        assert_eq!(last.finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.input_tokens, 9);
        assert_eq!(last.output_tokens, 2);
    }

    #[test]
    fn assistant_tool_calls_serialize_without_content() {
        let mut msg = ChatMessage::assistant("");
        msg.tool_calls = vec![ToolCall {
            id: "call_9".into(),
            name: "judge".into(),
            arguments: "{}".into(),
        }];
        let wire = convert_message(&msg);
        assert!(wire.content.is_none());
        assert_eq!(wire.tool_calls.as_ref().unwrap()[0].function.name, "judge");
    }
}
