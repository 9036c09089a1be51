// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE decoding for streaming chat completions.
//!
//! The Chat Completions stream uses bare `data:` events carrying one
//! [`ChatCompletionChunk`] each, terminated by a literal `[DONE]` sentinel.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use parley_core::ParleyError;

use crate::types::ChatCompletionChunk;

/// Parses a reqwest streaming response into typed chunks.
///
/// The `[DONE]` sentinel ends the stream; everything after it is ignored.
pub fn parse_chunk_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, ParleyError>> + Send>> {
    let stream = response
        .bytes_stream()
        .eventsource()
        .take_while(|event| {
            let done = matches!(event, Ok(e) if e.data.trim() == "[DONE]");
            futures::future::ready(!done)
        })
        .filter_map(|event| {
            let item = match event {
                Ok(event) => {
                    match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                        Ok(chunk) => Some(Ok(chunk)),
                        Err(e) => Some(Err(ParleyError::Provider {
                            message: format!("failed to parse stream chunk: {e}"),
                            source: Some(Box::new(e)),
                        })),
                    }
                }
                Err(e) => Some(Err(ParleyError::Provider {
                    message: format!("SSE stream error: {e}"),
                    source: Some(Box::new(e)),
                })),
            };
            futures::future::ready(item)
        });

    Box::pin(stream)
}
