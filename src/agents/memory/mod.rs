//! Agent memory
//!
//! - Short-term memory: the ordered conversation an agent reasons over
//! - Strategies: how that conversation is trimmed when formatted into a prompt
//! - Long-term memory: an external store the agent records to and retrieves from

mod in_memory;
mod long_term;
mod strategy;

pub use in_memory::InMemoryMemory;
pub use long_term::*;
pub use strategy::*;

use async_trait::async_trait;
use std::sync::Arc;

use crate::agents::config::MemoryConfig;
use crate::agents::domain::Message;
use crate::agents::error::AgentResult;

/// Short-term memory backend
#[async_trait]
pub trait MemoryBase: Send + Sync {
    /// Append messages in order
    async fn add(&self, messages: Vec<Message>) -> AgentResult<()>;

    /// Snapshot of the stored messages
    async fn get_memory(&self) -> AgentResult<Vec<Message>>;

    /// Number of stored messages
    async fn size(&self) -> usize;

    /// Remove the message at `index`
    async fn delete(&self, index: usize) -> AgentResult<()>;

    /// Remove everything
    async fn clear(&self) -> AgentResult<()>;
}

/// Create a short-term memory from configuration
pub fn create_memory(config: &MemoryConfig) -> Arc<dyn MemoryBase> {
    match config.max_messages {
        Some(max) => Arc::new(InMemoryMemory::with_limit(max)),
        None => Arc::new(InMemoryMemory::new()),
    }
}
