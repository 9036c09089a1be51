// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for Claude Messages API streaming responses.
//!
//! Converts a reqwest response byte stream into typed [`StreamEvent`]
//! variants using the `eventsource-stream` crate.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use parley_core::ParleyError;

use crate::types::{SseContentBlockDelta, SseError, SseMessageDelta, SseMessageStart};

/// Typed SSE events from the Claude streaming protocol.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Initial message metadata (id, model, usage).
    MessageStart(SseMessageStart),
    /// Incremental update to a content block (text delta, JSON delta).
    ContentBlockDelta(SseContentBlockDelta),
    /// Message-level delta (stop_reason, usage update).
    MessageDelta(SseMessageDelta),
    /// The message is complete.
    MessageStop,
    /// Keep-alive ping.
    Ping,
    /// API error during streaming.
    Error(SseError),
}

fn parse_error(kind: &str, err: serde_json::Error) -> ParleyError {
    ParleyError::Provider {
        message: format!("failed to parse {kind}: {err}"),
        source: Some(Box::new(err)),
    }
}

/// Parses a reqwest streaming response into typed [`StreamEvent`]s.
///
/// Unknown event types are silently skipped per the API's versioning
/// policy; `content_block_start`/`content_block_stop` fall under that rule
/// because the adapter only consumes deltas and terminal events.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, ParleyError>> + Send>> {
    let event_stream = response.bytes_stream().eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => {
                let parsed = match event.event.as_str() {
                    "message_start" => serde_json::from_str::<SseMessageStart>(&event.data)
                        .map(StreamEvent::MessageStart)
                        .map_err(|e| parse_error("message_start", e)),
                    "content_block_delta" => {
                        serde_json::from_str::<SseContentBlockDelta>(&event.data)
                            .map(StreamEvent::ContentBlockDelta)
                            .map_err(|e| parse_error("content_block_delta", e))
                    }
                    "message_delta" => serde_json::from_str::<SseMessageDelta>(&event.data)
                        .map(StreamEvent::MessageDelta)
                        .map_err(|e| parse_error("message_delta", e)),
                    "message_stop" => Ok(StreamEvent::MessageStop),
                    "ping" => Ok(StreamEvent::Ping),
                    "error" => serde_json::from_str::<SseError>(&event.data)
                        .map(StreamEvent::Error)
                        .map_err(|e| parse_error("error event", e)),
                    _ => return None,
                };
                Some(parsed)
            }
            Err(e) => Some(Err(ParleyError::Provider {
                message: format!("SSE stream error: {e}"),
                source: None,
            })),
        }
    });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serve raw SSE text through wiremock to get a real reqwest::Response.
    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;
        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn parses_text_delta_and_stop() {
        let sse = concat!(
            "event: content_block_delta\n",
            "data: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
            "event: message_stop\n",
            "data: {}\n\n",
        );
        let response = mock_sse_response(sse).await;
        let events: Vec<_> = parse_sse_stream(response).collect().await;
        assert_eq!(events.len(), 2);
        match events[0].as_ref().unwrap() {
            StreamEvent::ContentBlockDelta(d) => match &d.delta {
                crate::types::SseDelta::TextDelta { text } => assert_eq!(text, "Hello"),
                other => panic!("expected text delta, got {other:?}"),
            },
            other => panic!("expected delta event, got {other:?}"),
        }
        assert!(matches!(events[1].as_ref().unwrap(), StreamEvent::MessageStop));
    }

    #[tokio::test]
    async fn skips_unknown_events() {
        let sse = concat!(
            "event: content_block_start\n",
            "data: {\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: some_future_event\n",
            "data: {}\n\n",
            "event: ping\n",
            "data: {}\n\n",
        );
        let response = mock_sse_response(sse).await;
        let events: Vec<_> = parse_sse_stream(response).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].as_ref().unwrap(), StreamEvent::Ping));
    }

    #[tokio::test]
    async fn surfaces_error_events() {
        let sse = concat!(
            "event: error\n",
            "data: {\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        let response = mock_sse_response(sse).await;
        let events: Vec<_> = parse_sse_stream(response).collect().await;
        match events[0].as_ref().unwrap() {
            StreamEvent::Error(err) => assert_eq!(err.error.type_, "overloaded_error"),
            other => panic!("expected error event, got {other:?}"),
        }
    }
}
