//! Tool functions and the toolkit an agent acts with

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::agents::domain::{ToolChunk, ToolDefinition, ToolUse};

/// Stream of incremental tool output
pub type ToolStream = BoxStream<'static, anyhow::Result<ToolChunk>>;

/// A function the model can call
#[async_trait]
pub trait ToolFunction: Send + Sync {
    /// Schema presented to the model
    fn definition(&self) -> ToolDefinition;

    /// Start the call; output arrives as a stream of chunks
    async fn call(&self, input: Value) -> anyhow::Result<ToolStream>;

    fn name(&self) -> String {
        self.definition().name
    }
}

type ToolFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<ToolChunk>> + Send + Sync>;

/// Closure-backed tool producing a single chunk
pub struct FnTool {
    definition: ToolDefinition,
    f: ToolFn,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ToolChunk>> + Send + 'static,
    {
        Self {
            definition: ToolDefinition::new(name, description, parameters),
            f: Arc::new(move |input| Box::pin(f(input))),
        }
    }
}

#[async_trait]
impl ToolFunction for FnTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, input: Value) -> anyhow::Result<ToolStream> {
        let chunk = (self.f)(input).await?;
        Ok(stream::once(async move { Ok(chunk) }).boxed())
    }
}

/// Ordered set of tools, keyed by name
#[derive(Clone, Default)]
pub struct Toolkit {
    tools: Vec<Arc<dyn ToolFunction>>,
}

impl Toolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a tool with the same name is replaced in place
    pub fn register(&mut self, tool: Arc<dyn ToolFunction>) {
        let name = tool.name();
        match self.tools.iter_mut().find(|t| t.name() == name) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    /// Unregister a tool by name. Returns true if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|t| t.name() != name);
        self.tools.len() != before
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolFunction>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Definitions in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool use block
    ///
    /// Never fails: an unknown tool or a failing call becomes a final chunk
    /// carrying the error text, so the reasoning loop can keep going.
    pub async fn call_tool(&self, tool_use: &ToolUse) -> ToolStream {
        let Some(tool) = self.get(&tool_use.name) else {
            let chunk = ToolChunk::text(format!(
                "FunctionNotFoundError: Cannot find the function named {}",
                tool_use.name
            ));
            return stream::once(async move { Ok(chunk) }).boxed();
        };

        match tool.call(tool_use.input.clone()).await {
            Ok(output) => output
                .map(|item| Ok(item.unwrap_or_else(|e| ToolChunk::text(format!("Error: {}", e)))))
                .boxed(),
            Err(e) => {
                tracing::debug!(tool = %tool_use.name, error = %e, "Tool call failed");
                let chunk = ToolChunk::text(format!("Error: {}", e));
                stream::once(async move { Ok(chunk) }).boxed()
            }
        }
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit").field("tools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::domain::ContentBlock;
    use serde_json::json;

    fn add_tool() -> Arc<dyn ToolFunction> {
        Arc::new(FnTool::new(
            "add",
            "Add two integers",
            json!({"type": "object", "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}}}),
            |input: Value| async move {
                let a = input["a"].as_i64().unwrap_or(0);
                let b = input["b"].as_i64().unwrap_or(0);
                Ok(ToolChunk::text((a + b).to_string()))
            },
        ))
    }

    fn tool_use(name: &str, input: Value) -> ToolUse {
        ToolUse {
            id: "c1".into(),
            name: name.into(),
            input,
        }
    }

    async fn last_chunk(stream: ToolStream) -> ToolChunk {
        let chunks: Vec<_> = stream.collect().await;
        chunks.into_iter().last().unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_call_registered_tool() {
        let mut toolkit = Toolkit::new();
        toolkit.register(add_tool());
        let chunk = last_chunk(toolkit.call_tool(&tool_use("add", json!({"a": 2, "b": 3}))).await).await;
        assert_eq!(chunk.content, vec![ContentBlock::text("5")]);
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_not_found() {
        let toolkit = Toolkit::new();
        let chunk = last_chunk(toolkit.call_tool(&tool_use("nope", json!({}))).await).await;
        assert_eq!(
            chunk.content,
            vec![ContentBlock::text("FunctionNotFoundError: Cannot find the function named nope")]
        );
    }

    #[tokio::test]
    async fn test_failing_tool_is_wrapped() {
        let mut toolkit = Toolkit::new();
        toolkit.register(Arc::new(FnTool::new("fail", "", json!({}), |_| async {
            Err(anyhow::anyhow!("disk on fire"))
        })));
        let chunk = last_chunk(toolkit.call_tool(&tool_use("fail", json!({}))).await).await;
        assert_eq!(chunk.content, vec![ContentBlock::text("Error: disk on fire")]);
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut toolkit = Toolkit::new();
        toolkit.register(add_tool());
        toolkit.register(Arc::new(FnTool::new("other", "", json!({}), |_| async {
            Ok(ToolChunk::text(""))
        })));
        toolkit.register(add_tool());
        assert_eq!(toolkit.names(), vec!["add", "other"]);
        assert!(toolkit.remove("add"));
        assert!(!toolkit.remove("add"));
    }
}
