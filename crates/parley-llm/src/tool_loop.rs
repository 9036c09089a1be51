// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function-call driver.
//!
//! A function-call request is a chat completion with the registry's tool
//! specs attached, followed by local execution of whatever calls the
//! model issued. The adapter layer only carries the wire format; this
//! module owns the execution loop so every adapter behaves the same.

use parley_core::chat::{ChatMessage, ChatRequest, ChatResponse};
use parley_core::traits::ChatProvider;
use parley_core::ParleyError;
use parley_tools::ToolRegistry;
use tracing::debug;

/// Result of one function-call round.
#[derive(Debug)]
pub struct FunctionCallOutcome {
    /// One `tool` message per call the model issued, in call order.
    pub tool_results: Vec<ChatMessage>,
    /// The assistant turn carrying the tool calls, ready to append to the
    /// transcript ahead of `tool_results`. `None` when the model answered
    /// in plain text.
    pub assistant: Option<ChatMessage>,
    /// The accounted completion. When tool calls were issued its content
    /// is the serialized call list.
    pub completion: ChatResponse,
}

impl FunctionCallOutcome {
    /// True when the model invoked at least one tool.
    pub fn called_tools(&self) -> bool {
        !self.tool_results.is_empty()
    }
}

/// Runs one function-call round: POST with the registry's tool specs,
/// then execute the returned calls through the registry.
///
/// Tool failures are isolated per call by the registry and come back as
/// error-text `tool` messages; only transport-level errors surface as
/// `Err`.
pub async fn run_function_call(
    provider: &dyn ChatProvider,
    registry: &ToolRegistry,
    request: ChatRequest,
) -> Result<FunctionCallOutcome, ParleyError> {
    let specs = registry.specs();
    let mut completion = provider.function_call(request, &specs).await?;

    if completion.tool_calls.is_empty() {
        return Ok(FunctionCallOutcome {
            tool_results: Vec::new(),
            assistant: None,
            completion,
        });
    }

    debug!(
        model = %completion.model,
        calls = completion.tool_calls.len(),
        "executing model tool calls"
    );
    let tool_results = registry.handle_tool_calls(&completion.tool_calls).await;

    let mut assistant = ChatMessage::assistant(completion.content.clone());
    assistant.tool_calls = completion.tool_calls.clone();
    completion.content = serde_json::to_string(&completion.tool_calls)?;

    Ok(FunctionCallOutcome {
        tool_results,
        assistant: Some(assistant),
        completion,
    })
}
