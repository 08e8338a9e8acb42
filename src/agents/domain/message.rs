//! Message and content block types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata key flagging a message that carries an error instead of a reply
pub const ERROR_METADATA_KEY: &str = "error";

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions, tool results, injected context)
    System,
    /// User message
    User,
    /// Assistant (agent) message
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Where the bytes of a media block live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    /// Remote or local URL
    Url { url: String },
    /// Inline base64 payload
    Base64 { media_type: String, data: String },
}

/// The kind of a content block, used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    Image,
    Audio,
    Video,
}

/// A single block of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },
    /// Model reasoning trace
    Thinking { thinking: String },
    /// A tool invocation requested by the model
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The output of a tool invocation
    ToolResult {
        id: String,
        name: String,
        output: Vec<ContentBlock>,
    },
    /// Image content
    Image { source: MediaSource },
    /// Audio content
    Audio { source: MediaSource },
    /// Video content
    Video { source: MediaSource },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a thinking block
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
        }
    }

    /// Create a tool use block
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a tool result block
    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        output: Vec<ContentBlock>,
    ) -> Self {
        Self::ToolResult {
            id: id.into(),
            name: name.into(),
            output,
        }
    }

    /// The block's kind
    pub fn kind(&self) -> BlockKind {
        match self {
            ContentBlock::Text { .. } => BlockKind::Text,
            ContentBlock::Thinking { .. } => BlockKind::Thinking,
            ContentBlock::ToolUse { .. } => BlockKind::ToolUse,
            ContentBlock::ToolResult { .. } => BlockKind::ToolResult,
            ContentBlock::Image { .. } => BlockKind::Image,
            ContentBlock::Audio { .. } => BlockKind::Audio,
            ContentBlock::Video { .. } => BlockKind::Video,
        }
    }
}

/// A tool use block borrowed out of a message
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The unit of communication between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    /// Sender name
    pub name: String,
    /// Conversational role
    pub role: Role,
    /// Ordered content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Creation time (RFC 3339)
    pub timestamp: String,
    /// Correlation id of the model invocation that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
}

impl Message {
    /// Create a message from content blocks
    pub fn new(name: impl Into<String>, role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: generate_message_id(),
            name: name.into(),
            role,
            content,
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            invocation_id: None,
        }
    }

    /// Create a single-text-block message
    pub fn text(name: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self::new(name, role, vec![ContentBlock::text(text)])
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", Role::User, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", Role::System, content)
    }

    /// Create an assistant message
    pub fn assistant(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::text(name, Role::Assistant, content)
    }

    /// Create an error-flagged assistant message
    pub fn error(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::assistant(name, content).with_metadata(ERROR_METADATA_KEY, Value::Bool(true))
    }

    /// The message id, fixed at creation
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the message carries an error instead of a reply
    pub fn is_error(&self) -> bool {
        self.metadata
            .get(ERROR_METADATA_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Text blocks joined by newlines, `None` when there are none
    pub fn get_text_content(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }

    /// Blocks of the given kind, in order
    pub fn content_blocks(&self, kind: BlockKind) -> Vec<&ContentBlock> {
        self.content.iter().filter(|b| b.kind() == kind).collect()
    }

    /// Whether at least one block of the given kind is present
    pub fn has_content_blocks(&self, kind: BlockKind) -> bool {
        self.content.iter().any(|b| b.kind() == kind)
    }

    /// Tool use blocks, in order
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Generate a fresh message id
pub fn generate_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
