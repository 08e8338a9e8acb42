//! Long-term memory port
//!
//! Static control: the agent retrieves before reasoning and records after the
//! reply. Agent control: the model decides, through the
//! `record_to_memory` / `retrieve_from_memory` tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::agents::domain::{Message, ToolChunk};
use crate::agents::error::AgentResult;
use crate::agents::tools::{FnTool, ToolFunction};

/// External memory that outlives a conversation
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// Record a finished exchange
    async fn record(&self, messages: &[Message]) -> AgentResult<()>;

    /// Retrieve context relevant to the given messages, if any
    async fn retrieve(&self, messages: &[Message]) -> AgentResult<Option<String>>;

    /// Record content chosen by the model
    async fn record_to_memory(&self, thinking: &str, content: Vec<String>) -> AgentResult<String>;

    /// Retrieve by model-chosen keywords
    async fn retrieve_from_memory(&self, keywords: Vec<String>) -> AgentResult<String>;
}

/// Keyword-matching long-term memory held in process memory
#[derive(Default)]
pub struct InMemoryLongTermMemory {
    entries: RwLock<Vec<String>>,
}

impl InMemoryLongTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<String> {
        self.entries.read().await.clone()
    }

    async fn search(&self, keywords: &[String]) -> Vec<String> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| {
                let entry = entry.to_lowercase();
                keywords.iter().any(|k| entry.contains(k.as_str()))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LongTermMemory for InMemoryLongTermMemory {
    async fn record(&self, messages: &[Message]) -> AgentResult<()> {
        let mut entries = self.entries.write().await;
        for message in messages {
            if let Some(text) = message.get_text_content() {
                entries.push(format!("{}: {}", message.name, text));
            }
        }
        Ok(())
    }

    async fn retrieve(&self, messages: &[Message]) -> AgentResult<Option<String>> {
        let keywords: Vec<String> = messages
            .iter()
            .filter_map(Message::get_text_content)
            .flat_map(|text| {
                text.split_whitespace()
                    .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
                    .filter(|w| w.len() > 3)
                    .collect::<Vec<_>>()
            })
            .collect();

        let hits = self.search(&keywords).await;
        Ok((!hits.is_empty()).then(|| hits.join("\n")))
    }

    async fn record_to_memory(&self, _thinking: &str, content: Vec<String>) -> AgentResult<String> {
        let count = content.len();
        self.entries.write().await.extend(content);
        Ok(format!("Successfully recorded {} item(s) to memory.", count))
    }

    async fn retrieve_from_memory(&self, keywords: Vec<String>) -> AgentResult<String> {
        let hits = self.search(&keywords).await;
        if hits.is_empty() {
            Ok("No relevant memory found.".to_string())
        } else {
            Ok(hits.join("\n"))
        }
    }
}

fn string_list(input: &Value, key: &str) -> Vec<String> {
    input
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

/// Tools that let the model drive long-term memory
pub fn long_term_memory_tools(memory: Arc<dyn LongTermMemory>) -> Vec<Arc<dyn ToolFunction>> {
    let recorder = memory.clone();
    let record = FnTool::new(
        "record_to_memory",
        "Record important information to long-term memory for future conversations.",
        json!({
            "type": "object",
            "properties": {
                "thinking": {"type": "string", "description": "Why this is worth remembering"},
                "content": {"type": "array", "items": {"type": "string"}, "description": "Items to remember"}
            },
            "required": ["thinking", "content"]
        }),
        move |input: Value| {
            let memory = recorder.clone();
            async move {
                let thinking = input.get("thinking").and_then(Value::as_str).unwrap_or_default();
                let result = memory
                    .record_to_memory(thinking, string_list(&input, "content"))
                    .await?;
                Ok(ToolChunk::text(result))
            }
        },
    );

    let retriever = memory;
    let retrieve = FnTool::new(
        "retrieve_from_memory",
        "Retrieve information from long-term memory by keywords.",
        json!({
            "type": "object",
            "properties": {
                "keywords": {"type": "array", "items": {"type": "string"}, "description": "Keywords to search for"}
            },
            "required": ["keywords"]
        }),
        move |input: Value| {
            let memory = retriever.clone();
            async move {
                let result = memory.retrieve_from_memory(string_list(&input, "keywords")).await?;
                Ok(ToolChunk::text(result))
            }
        },
    );

    vec![Arc::new(record), Arc::new(retrieve)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_then_retrieve() {
        let ltm = InMemoryLongTermMemory::new();
        ltm.record(&[Message::user("My favourite colour is green")])
            .await
            .unwrap();

        let hit = ltm
            .retrieve(&[Message::user("what colour do I like?")])
            .await
            .unwrap();
        assert_eq!(hit.as_deref(), Some("user: My favourite colour is green"));

        let miss = ltm.retrieve(&[Message::user("weather")]).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_agent_control_tools() {
        let ltm: Arc<dyn LongTermMemory> = Arc::new(InMemoryLongTermMemory::new());
        let tools = long_term_memory_tools(ltm.clone());
        assert_eq!(tools[0].name(), "record_to_memory");
        assert_eq!(tools[1].name(), "retrieve_from_memory");

        ltm.record_to_memory("", vec!["Paris trip in May".into()])
            .await
            .unwrap();
        let found = ltm.retrieve_from_memory(vec!["paris".into()]).await.unwrap();
        assert_eq!(found, "Paris trip in May");
    }
}
