//! Streaming types for chat model responses

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::{CompletionResponse, FinishReason, TokenUsage};
use crate::agents::domain::ContentBlock;
use crate::agents::error::LlmError;

/// A chunk of a streamed model response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Delta text
    #[serde(default)]
    pub content: String,
    /// Delta reasoning trace
    #[serde(default)]
    pub thinking: String,
    /// Tool calls being made (partial or complete)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
    /// Finish reason (if this is the final chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Token usage (usually only in final chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// Create a text content chunk
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a thinking chunk
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self {
            thinking: thinking.into(),
            ..Default::default()
        }
    }

    /// Create a tool call chunk
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_calls: vec![delta],
            ..Default::default()
        }
    }

    /// Create a finish chunk
    pub fn finish(reason: FinishReason, usage: Option<TokenUsage>) -> Self {
        Self {
            finish_reason: Some(reason),
            usage,
            ..Default::default()
        }
    }

    /// Check if this is a final chunk
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Delta update for a tool call (streaming tool calls)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Index of the tool call being updated
    pub index: usize,
    /// Tool call ID (may be partial)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name (may be partial)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments JSON string (partial, accumulated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            id: None,
            name: None,
            arguments: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, args: impl Into<String>) -> Self {
        self.arguments = Some(args.into());
        self
    }
}

/// Accumulator for building tool use blocks from streaming deltas
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    tool_calls: Vec<ToolCallBuilder>,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a delta update
    pub fn apply_delta(&mut self, delta: &ToolCallDelta) {
        while self.tool_calls.len() <= delta.index {
            self.tool_calls.push(ToolCallBuilder::default());
        }

        let builder = &mut self.tool_calls[delta.index];

        if let Some(id) = &delta.id {
            builder.id.push_str(id);
        }
        if let Some(name) = &delta.name {
            builder.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            builder.arguments.push_str(args);
        }
    }

    /// Tool use blocks built so far; incomplete argument JSON reads as `{}`
    pub fn blocks(&self) -> Vec<ContentBlock> {
        self.tool_calls
            .iter()
            .filter(|b| !b.id.is_empty() && !b.name.is_empty())
            .map(|b| {
                let input = serde_json::from_str(&b.arguments)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                ContentBlock::tool_use(b.id.clone(), b.name.clone(), input)
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Running view of a streamed response
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    thinking: String,
    text: String,
    tools: ToolCallAccumulator,
    finish_reason: Option<FinishReason>,
    usage: Option<TokenUsage>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the running response
    pub fn apply(&mut self, chunk: &StreamChunk) {
        self.thinking.push_str(&chunk.thinking);
        self.text.push_str(&chunk.content);
        for delta in &chunk.tool_calls {
            self.tools.apply_delta(delta);
        }
        if let Some(reason) = chunk.finish_reason {
            self.finish_reason = Some(reason);
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage.clone();
        }
    }

    /// Content blocks accumulated so far: thinking, text, then tool uses
    pub fn blocks(&self) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        if !self.thinking.is_empty() {
            blocks.push(ContentBlock::thinking(self.thinking.clone()));
        }
        if !self.text.is_empty() {
            blocks.push(ContentBlock::text(self.text.clone()));
        }
        blocks.extend(self.tools.blocks());
        blocks
    }

    /// Finish into a complete response
    pub fn finish(self) -> CompletionResponse {
        let content = self.blocks();
        let finish_reason = self.finish_reason.unwrap_or(if self.tools.has_tool_calls() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        });
        CompletionResponse {
            content,
            finish_reason,
            usage: self.usage,
        }
    }
}

/// Streaming response from a chat model
pub struct LlmStream {
    receiver: mpsc::Receiver<Result<StreamChunk, LlmError>>,
}

impl LlmStream {
    /// Create a new stream from a channel receiver
    pub fn new(receiver: mpsc::Receiver<Result<StreamChunk, LlmError>>) -> Self {
        Self { receiver }
    }

    /// Create a channel pair for building a stream
    pub fn channel(buffer: usize) -> (LlmStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (LlmStreamSender { sender: tx }, Self { receiver: rx })
    }

    /// Replay a complete response as a single-chunk stream
    pub fn from_response(response: CompletionResponse) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let mut chunk = StreamChunk::finish(response.finish_reason, response.usage);
        let mut index = 0;
        for block in response.content {
            match block {
                ContentBlock::Text { text } => chunk.content.push_str(&text),
                ContentBlock::Thinking { thinking } => chunk.thinking.push_str(&thinking),
                ContentBlock::ToolUse { id, name, input } => {
                    chunk.tool_calls.push(
                        ToolCallDelta::new(index)
                            .with_id(id)
                            .with_name(name)
                            .with_arguments(input.to_string()),
                    );
                    index += 1;
                }
                _ => {}
            }
        }
        // Capacity 1 on a fresh channel, so this cannot fail
        let _ = tx.try_send(Ok(chunk));
        Self { receiver: rx }
    }

    /// Collect all chunks into a complete response
    pub async fn collect_response(mut self) -> Result<CompletionResponse, LlmError> {
        let mut accumulator = ResponseAccumulator::new();
        while let Some(result) = self.receiver.recv().await {
            accumulator.apply(&result?);
        }
        Ok(accumulator.finish())
    }
}

impl Stream for LlmStream {
    type Item = Result<StreamChunk, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

type SendResult = Result<(), mpsc::error::SendError<Result<StreamChunk, LlmError>>>;

/// Sender half for building a stream
#[derive(Clone)]
pub struct LlmStreamSender {
    sender: mpsc::Sender<Result<StreamChunk, LlmError>>,
}

impl LlmStreamSender {
    pub async fn send(&self, chunk: StreamChunk) -> SendResult {
        self.sender.send(Ok(chunk)).await
    }

    pub async fn send_error(&self, error: LlmError) -> SendResult {
        self.sender.send(Err(error)).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> SendResult {
        self.send(StreamChunk::text(text)).await
    }

    pub async fn send_finish(&self, reason: FinishReason, usage: Option<TokenUsage>) -> SendResult {
        self.send(StreamChunk::finish(reason, usage)).await
    }

    /// Check if the receiver is closed
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accumulator_orders_blocks() {
        let mut acc = ResponseAccumulator::new();
        acc.apply(&StreamChunk::text("Hel"));
        acc.apply(&StreamChunk::thinking("plan"));
        acc.apply(&StreamChunk::text("lo"));
        acc.apply(&StreamChunk::tool_call(
            ToolCallDelta::new(0).with_id("c1").with_name("search").with_arguments("{\"q\":"),
        ));

        let blocks = acc.blocks();
        assert_eq!(blocks[0], ContentBlock::thinking("plan"));
        assert_eq!(blocks[1], ContentBlock::text("Hello"));
        // Partial arguments read as an empty object until complete
        assert_eq!(blocks[2], ContentBlock::tool_use("c1", "search", json!({})));

        acc.apply(&StreamChunk::tool_call(ToolCallDelta::new(0).with_arguments("\"rust\"}")));
        let response = acc.finish();
        assert_eq!(response.content[2], ContentBlock::tool_use("c1", "search", json!({"q": "rust"})));
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    }

    #[tokio::test]
    async fn test_from_response_round_trips() {
        let response = CompletionResponse {
            content: vec![
                ContentBlock::text("hi"),
                ContentBlock::tool_use("c1", "add", json!({"a": 1})),
            ],
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        };
        let collected = LlmStream::from_response(response.clone()).collect_response().await.unwrap();
        assert_eq!(collected.content, response.content);
    }

    #[tokio::test]
    async fn test_stream_error_surfaces() {
        let (tx, stream) = LlmStream::channel(4);
        tx.send_text("partial").await.unwrap();
        tx.send_error(LlmError::Streaming("reset".into())).await.unwrap();
        drop(tx);
        assert!(stream.collect_response().await.is_err());
    }
}
