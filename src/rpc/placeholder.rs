//! Handle on a reply that is still being produced remotely
//!
//! The first `resolve` fetches the result; concurrent and later callers share
//! that single fetch. Sent over the wire before it resolved, a placeholder is
//! an empty message whose `placeholder` metadata names the originating server
//! and task, and the receiving side fetches the result itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{RpcClient, RpcResult};
use crate::agents::domain::{Message, Role};
use crate::config::ClientSettings;

pub const PLACEHOLDER_METADATA_KEY: &str = "placeholder";

/// Where a pending result lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderRef {
    pub host: String,
    pub port: u16,
    pub task_id: u64,
}

impl PlaceholderRef {
    /// The reference carried by a wire placeholder, if `msg` is one
    pub fn from_message(msg: &Message) -> Option<Self> {
        msg.metadata
            .get(PLACEHOLDER_METADATA_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Fetches the final message of a remote task
#[async_trait]
pub trait ResultFetcher: Send + Sync {
    async fn fetch_result(&self, task_id: u64) -> RpcResult<Message>;
}

pub struct PlaceholderMessage {
    name: String,
    reference: PlaceholderRef,
    fetcher: Arc<dyn ResultFetcher>,
    resolved: OnceCell<Message>,
}

impl PlaceholderMessage {
    pub fn new(name: impl Into<String>, reference: PlaceholderRef, fetcher: Arc<dyn ResultFetcher>) -> Self {
        Self {
            name: name.into(),
            reference,
            fetcher,
            resolved: OnceCell::new(),
        }
    }

    pub fn task_id(&self) -> u64 {
        self.reference.task_id
    }

    pub fn reference(&self) -> &PlaceholderRef {
        &self.reference
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    /// The real message, fetched on first use
    pub async fn resolve(&self) -> RpcResult<&Message> {
        self.resolved
            .get_or_try_init(|| self.fetcher.fetch_result(self.reference.task_id))
            .await
    }

    pub async fn into_message(self) -> RpcResult<Message> {
        self.resolve().await?;
        Ok(self.resolved.into_inner().unwrap_or_else(|| {
            Message::error(&self.name, "placeholder lost its resolved message")
        }))
    }

    /// Message to send to another process
    ///
    /// The resolved message once available, otherwise an empty message
    /// pointing at the task.
    pub fn to_wire(&self) -> Message {
        if let Some(message) = self.resolved.get() {
            return message.clone();
        }
        let reference = serde_json::to_value(&self.reference).unwrap_or_default();
        Message::new(&self.name, Role::Assistant, Vec::new())
            .with_metadata(PLACEHOLDER_METADATA_KEY, reference)
    }
}

impl fmt::Debug for PlaceholderMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceholderMessage")
            .field("name", &self.name)
            .field("reference", &self.reference)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Replace a wire placeholder by the message it stands for
pub async fn resolve_wire_message(msg: Message, settings: &ClientSettings) -> RpcResult<Message> {
    match PlaceholderRef::from_message(&msg) {
        Some(reference) => {
            tracing::debug!(
                host = %reference.host,
                port = reference.port,
                task_id = reference.task_id,
                "Resolving placeholder message"
            );
            RpcClient::with_settings(&reference.host, reference.port, settings.clone())?
                .fetch_result(reference.task_id)
                .await
        }
        None => Ok(msg),
    }
}
