//! Scripted chat model that replays canned responses

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use super::{ChatModel, CompletionRequest, CompletionResponse, LlmStream, StreamChunk, ToolCallDelta};
use crate::agents::domain::ContentBlock;
use crate::agents::error::{LlmError, LlmResult};

/// Replays a queue of responses, one per call
///
/// Streaming splits text on spaces so callers see several chunks per
/// response. Every request is recorded for inspection.
pub struct ScriptedModel {
    name: String,
    script: Mutex<VecDeque<CompletionResponse>>,
    fallback: Option<CompletionResponse>,
    chunk_delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    /// Replay `responses` in order, failing once they run out
    pub fn new(name: impl Into<String>, responses: Vec<CompletionResponse>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(responses.into()),
            fallback: None,
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same response
    pub fn repeating(name: impl Into<String>, response: CompletionResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(name, Vec::new())
        }
    }

    /// Sleep between streamed chunks
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| LlmError::InvalidRequest(format!("{}: script exhausted", self.name)))
    }
}

fn into_chunks(response: CompletionResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    let mut tool_index = 0;
    for block in response.content {
        match block {
            ContentBlock::Thinking { thinking } => chunks.push(StreamChunk::thinking(thinking)),
            ContentBlock::Text { text } => {
                chunks.extend(text.split_inclusive(' ').map(StreamChunk::text));
            }
            ContentBlock::ToolUse { id, name, input } => {
                chunks.push(StreamChunk::tool_call(
                    ToolCallDelta::new(tool_index)
                        .with_id(id)
                        .with_name(name)
                        .with_arguments(input.to_string()),
                ));
                tool_index += 1;
            }
            _ => {}
        }
    }
    chunks.push(StreamChunk::finish(response.finish_reason, response.usage));
    chunks
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        self.next_response(request)
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        let (tx, stream) = LlmStream::channel(16);
        let delay = self.chunk_delay;
        let next = self.next_response(request);

        tokio::spawn(async move {
            let chunks = match next {
                Ok(response) => into_chunks(response),
                Err(e) => {
                    let _ = tx.send_error(e).await;
                    return;
                }
            };
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        stream
    }
}
