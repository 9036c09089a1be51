// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation hygiene applied before every provider call.
//!
//! Agent memories are replayed from persisted sessions, so a message list
//! can contain tool results whose originating assistant turn was trimmed
//! away. Providers reject such orphans, so they are dropped here.

use std::collections::HashSet;

use parley_core::chat::ChatMessage;
use tracing::warn;

/// Removes tool messages that do not answer a tool call issued by an
/// earlier assistant message. Providers require the call to precede the
/// result, so an id that only shows up later in the list does not save
/// the message. Everything else passes through in order.
pub fn sanitize_messages(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut seen_call_ids: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == "tool" {
            let orphan = message
                .tool_call_id
                .as_deref()
                .is_none_or(|id| !seen_call_ids.contains(id));
            if orphan {
                warn!(
                    tool_call_id = ?message.tool_call_id,
                    "dropping orphan tool message"
                );
                continue;
            }
        }
        if message.role == "assistant" {
            seen_call_ids.extend(message.tool_calls.iter().map(|call| call.id.clone()));
        }
        kept.push(message);
    }
    kept
}
