//! In-memory short-term memory

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::MemoryBase;
use crate::agents::domain::Message;
use crate::agents::error::{AgentError, AgentResult};

/// Ordered message list held in process memory
pub struct InMemoryMemory {
    messages: RwLock<Vec<Message>>,
    max_messages: Option<usize>,
}

impl InMemoryMemory {
    /// Create an unbounded memory
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            max_messages: None,
        }
    }

    /// Create a memory that keeps at most `max_messages`, dropping the oldest
    pub fn with_limit(max_messages: usize) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            max_messages: Some(max_messages),
        }
    }
}

impl Default for InMemoryMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBase for InMemoryMemory {
    async fn add(&self, messages: Vec<Message>) -> AgentResult<()> {
        let mut stored = self.messages.write().await;

        for message in messages {
            // Re-adding a message already in memory is a no-op
            if stored.iter().any(|m| m.id() == message.id()) {
                continue;
            }
            stored.push(message);
        }

        if let Some(max) = self.max_messages {
            if stored.len() > max {
                let remove_count = stored.len() - max;
                stored.drain(0..remove_count);
            }
        }

        Ok(())
    }

    async fn get_memory(&self) -> AgentResult<Vec<Message>> {
        Ok(self.messages.read().await.clone())
    }

    async fn size(&self) -> usize {
        self.messages.read().await.len()
    }

    async fn delete(&self, index: usize) -> AgentResult<()> {
        let mut stored = self.messages.write().await;
        if index >= stored.len() {
            return Err(AgentError::Memory(format!(
                "index {} out of range for memory of size {}",
                index,
                stored.len()
            )));
        }
        stored.remove(index);
        Ok(())
    }

    async fn clear(&self) -> AgentResult<()> {
        self.messages.write().await.clear();
        Ok(())
    }
}
