// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage-accounted provider wrapper.
//!
//! Wraps any [`ChatProvider`] and records a [`UsageRecord`] for every
//! call. Provider failures are shaped into an assistant response with
//! `finish_reason: "error"` and zero tokens, which is still accounted,
//! so callers and reporting both see every attempt.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use async_trait::async_trait;
use futures::Stream;
use parley_core::chat::{ChatChunk, ChatRequest, ChatResponse, ToolSpec};
use parley_core::records::ModelRecord;
use parley_core::traits::{ChatProvider, ChatStream};
use parley_core::{HealthStatus, ParleyError};
use parley_usage::{
    calculate_price, record_best_effort, CallContext, UsageRecord, UsageSink, DEFAULT_SCENARIO,
};
use tracing::warn;

use crate::hygiene::sanitize_messages;

/// A [`ChatProvider`] that prices and records every call.
#[derive(Clone)]
pub struct AccountedProvider {
    inner: Arc<dyn ChatProvider>,
    model: ModelRecord,
    sink: Arc<dyn UsageSink>,
    session_id: Option<String>,
    scenario: String,
}

impl std::fmt::Debug for AccountedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountedProvider")
            .field("model", &self.model)
            .field("session_id", &self.session_id)
            .field("scenario", &self.scenario)
            .finish_non_exhaustive()
    }
}

impl AccountedProvider {
    pub fn new(inner: Arc<dyn ChatProvider>, model: ModelRecord, sink: Arc<dyn UsageSink>) -> Self {
        Self {
            inner,
            model,
            sink,
            session_id: None,
            scenario: DEFAULT_SCENARIO.to_string(),
        }
    }

    /// Returns a copy whose usage records carry the given session id.
    pub fn for_session(&self, session_id: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.session_id = Some(session_id.into());
        copy
    }

    /// Returns a copy whose usage records carry the given scenario tag.
    pub fn for_scenario(&self, scenario: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.scenario = scenario.into();
        copy
    }

    pub fn model_record(&self) -> &ModelRecord {
        &self.model
    }

    fn capture_context(request: &ChatRequest) -> CallContext {
        CallContext {
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    async fn account(
        &self,
        input_tokens: i64,
        output_tokens: i64,
        elapsed_ms: u64,
        scenario: String,
        context: Option<CallContext>,
    ) {
        let price = calculate_price(
            input_tokens,
            output_tokens,
            self.model.input_price,
            self.model.output_price,
        );
        let mut record = UsageRecord::new(
            self.session_id.clone(),
            self.model.model_id.clone(),
            self.model.provider_id,
            input_tokens,
            output_tokens,
            price,
            elapsed_ms,
        )
        .with_scenario(scenario);
        if let Some(context) = context {
            record = record.with_context(context);
        }
        record_best_effort(self.sink.as_ref(), record).await;
    }

    async fn settle(
        &self,
        result: Result<ChatResponse, ParleyError>,
        started: Instant,
        scenario: String,
        context: CallContext,
    ) -> ChatResponse {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(model_id = %self.model.model_id, error = %e, "provider call failed");
                ChatResponse::error_shaped(&self.model.model_id, &e.to_string())
            }
        };
        response.price = Some(calculate_price(
            response.input_tokens,
            response.output_tokens,
            self.model.input_price,
            self.model.output_price,
        ));
        self.account(
            response.input_tokens,
            response.output_tokens,
            elapsed_ms,
            scenario,
            Some(context),
        )
        .await;
        response
    }
}

/// Settles a streaming call's usage exactly once, whether the stream
/// reaches its terminal chunk or is dropped mid-flight.
struct StreamAccounting {
    accountant: AccountedProvider,
    started: Instant,
    scenario: String,
    context: Option<CallContext>,
    input_tokens: i64,
    output_tokens: i64,
    settled: bool,
}

impl StreamAccounting {
    fn observe(&mut self, chunk: &ChatChunk) {
        self.input_tokens = self.input_tokens.max(chunk.input_tokens);
        self.output_tokens = self.output_tokens.max(chunk.output_tokens);
        if chunk.finish_reason.is_some() {
            self.settle();
        }
    }

    fn settle(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        let accountant = self.accountant.clone();
        let (input, output) = (self.input_tokens, self.output_tokens);
        let scenario = self.scenario.clone();
        let context = self.context.take();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    accountant
                        .account(input, output, elapsed_ms, scenario, context)
                        .await;
                });
            }
            Err(_) => {
                warn!(
                    model_id = %accountant.model.model_id,
                    "no runtime to settle stream usage"
                );
            }
        }
    }
}

impl Drop for StreamAccounting {
    fn drop(&mut self) {
        self.settle();
    }
}

struct AccountedStream {
    inner: ChatStream,
    guard: StreamAccounting,
}

impl Stream for AccountedStream {
    type Item = Result<ChatChunk, ParleyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            this.guard.observe(chunk);
        }
        polled
    }
}

#[async_trait]
impl ChatProvider for AccountedProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        &self.model.model_id
    }

    async fn chat(&self, mut request: ChatRequest) -> Result<ChatResponse, ParleyError> {
        request.messages = sanitize_messages(request.messages);
        let context = Self::capture_context(&request);
        let started = Instant::now();
        let result = self.inner.chat(request).await;
        Ok(self
            .settle(result, started, self.scenario.clone(), context)
            .await)
    }

    async fn chat_stream(&self, mut request: ChatRequest) -> Result<ChatStream, ParleyError> {
        request.messages = sanitize_messages(request.messages);
        let context = Self::capture_context(&request);
        let started = Instant::now();
        let inner = self.inner.chat_stream(request).await?;

        // The terminal chunk carries the token totals. A stream dropped
        // before the terminal chunk still settles through the guard, with
        // whatever counts the chunks carried so far.
        let guard = StreamAccounting {
            accountant: self.clone(),
            started,
            scenario: self.scenario.clone(),
            context: Some(context),
            input_tokens: 0,
            output_tokens: 0,
            settled: false,
        };
        Ok(Box::pin(AccountedStream { inner, guard }))
    }

    async fn function_call(
        &self,
        mut request: ChatRequest,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ParleyError> {
        request.messages = sanitize_messages(request.messages);
        let context = Self::capture_context(&request);
        let started = Instant::now();
        let result = self.inner.function_call(request, tools).await;
        let scenario = format!("{}-function_call", self.scenario);
        Ok(self.settle(result, started, scenario, context).await)
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parley_core::chat::ChatMessage;
    use parley_test_utils::MockProvider;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct RecordingSink {
        records: Mutex<Vec<UsageRecord>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl UsageSink for RecordingSink {
        async fn record_usage(&self, record: &UsageRecord) -> Result<(), ParleyError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn model_record() -> ModelRecord {
        ModelRecord {
            model_id: "gpt-4o".into(),
            provider_id: 1,
            display_name: "GPT-4o".into(),
            input_price: dec!(0.002),
            output_price: dec!(0.006),
            status: true,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    #[tokio::test]
    async fn chat_records_priced_usage() {
        let mock = MockProvider::new();
        mock.push_text("the answer").await;
        let sink = RecordingSink::new();
        let provider = AccountedProvider::new(Arc::new(mock), model_record(), sink.clone())
            .for_session("sess-1");

        let response = provider
            .chat(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap();
        assert_eq!(response.content, "the answer");
        // 10 in @ 0.002/1K + 20 out @ 0.006/1K
        assert_eq!(response.price, Some(dec!(0.00014)));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id.as_deref(), Some("sess-1"));
        assert_eq!(records[0].input_tokens, 10);
        assert_eq!(records[0].price, dec!(0.00014));
        assert_eq!(records[0].application_scenario, "base");
        // The sanitized request travels with the record.
        let context = records[0].context.as_ref().unwrap();
        assert_eq!(context.messages.len(), 1);
        assert_eq!(context.messages[0].content, "q");
    }

    #[tokio::test]
    async fn function_call_scenario_is_suffixed() {
        let mock = MockProvider::new();
        mock.push_text("plain").await;
        let sink = RecordingSink::new();
        let provider = AccountedProvider::new(Arc::new(mock), model_record(), sink.clone())
            .for_scenario("game");

        provider
            .function_call(ChatRequest::new(vec![ChatMessage::user("q")]), &[])
            .await
            .unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].application_scenario, "game-function_call");
    }

    #[tokio::test]
    async fn failure_is_shaped_and_still_accounted() {
        let mock = MockProvider::new();
        mock.push_failure("upstream exploded").await;
        let sink = RecordingSink::new();
        let provider = AccountedProvider::new(Arc::new(mock), model_record(), sink.clone());

        let response = provider
            .chat(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap();
        assert!(response.is_error());
        assert_eq!(response.finish_reason, "error");
        assert_eq!(response.total_tokens, 0);
        assert!(response.content.contains("upstream exploded"));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input_tokens, 0);
        assert_eq!(records[0].price, dec!(0));
    }

    #[tokio::test]
    async fn stream_records_terminal_chunk_usage() {
        let mock = MockProvider::new();
        mock.push_text("one two three").await;
        let sink = RecordingSink::new();
        let provider = AccountedProvider::new(Arc::new(mock), model_record(), sink.clone());

        let stream = provider
            .chat_stream(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap();
        let chunks: Vec<_> = stream.collect().await;
        assert!(chunks.iter().all(|c| c.is_ok()));

        wait_for_record(&sink).await;
        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input_tokens, 10);
        assert_eq!(records[0].output_tokens, 20);
    }

    #[tokio::test]
    async fn abandoned_stream_still_settles_usage() {
        let mock = MockProvider::new();
        mock.push_text("one two three").await;
        let sink = RecordingSink::new();
        let provider = AccountedProvider::new(Arc::new(mock), model_record(), sink.clone())
            .for_session("sess-drop");

        let mut stream = provider
            .chat_stream(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap();
        // Take one chunk, then walk away mid-stream.
        let first = stream.next().await.unwrap().unwrap();
        assert!(first.finish_reason.is_none());
        drop(stream);

        wait_for_record(&sink).await;
        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id.as_deref(), Some("sess-drop"));
    }

    /// Stream settlement runs on a spawned task; give it a moment.
    async fn wait_for_record(sink: &Arc<RecordingSink>) {
        for _ in 0..50 {
            if !sink.records.lock().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }
}
