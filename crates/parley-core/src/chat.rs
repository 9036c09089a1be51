// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat request and response types shared by every provider adapter.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default sampling temperature applied when a request leaves it unset.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    pub arguments: String,
}

/// A tool surface advertised to the model on function-call requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's argument object.
    pub parameters: serde_json::Value,
}

/// One message in a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Tool calls issued by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `tool` messages to link the result to its originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    pub fn plain(role: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.into(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// A provider-agnostic chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the adapter's configured model when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        ChatRequest {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Effective sampling temperature, falling back to [`DEFAULT_TEMPERATURE`].
    pub fn effective_temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

/// A complete, non-streaming provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    pub role: String,
    pub finish_reason: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    /// Wall-clock time the call took, stamped by the adapter layer.
    pub elapsed_ms: u64,
    /// Cost of the call, stamped by usage accounting after recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    /// Builds the error-shaped response every failed call collapses into.
    ///
    /// Carries zero tokens so downstream accounting records the attempt
    /// without charging for it.
    pub fn error_shaped(model: impl Into<String>, message: impl Into<String>) -> Self {
        ChatResponse {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            content: message.into(),
            role: "assistant".into(),
            finish_reason: "error".into(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            elapsed_ms: 0,
            price: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.finish_reason == "error"
    }
}

/// A single chunk of a streaming provider response.
///
/// The terminal chunk (non-empty `finish_reason`) carries the final token
/// totals when the backend reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: String,
    pub model: String,
    pub delta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_temperature_defaults() {
        let req = ChatRequest::new(vec![ChatMessage::user("hi")]);
        assert_eq!(req.effective_temperature(), DEFAULT_TEMPERATURE);
        assert_eq!(req.with_temperature(0.8).effective_temperature(), 0.8);
    }

    #[test]
    fn error_shaped_response_carries_zero_tokens() {
        let resp = ChatResponse::error_shaped("gpt-4o", "boom");
        assert!(resp.is_error());
        assert_eq!(resp.total_tokens, 0);
        assert_eq!(resp.content, "boom");
    }

    #[test]
    fn chat_message_skips_empty_tool_fields() {
        let json = serde_json::to_value(ChatMessage::user("q")).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }
}
