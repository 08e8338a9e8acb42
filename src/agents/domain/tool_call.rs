//! Tool definition and tool output types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::ContentBlock;

/// Generate a unique ID for a tool call
pub fn generate_tool_call_id() -> String {
    format!("call_{}", &uuid::Uuid::new_v4().simple().to_string()[..24])
}

/// Definition of a tool available to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema defining the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One incremental piece of tool output
///
/// Streaming tools yield several chunks; each chunk carries the full output
/// accumulated so far, and the final one has `is_last` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChunk {
    /// Output so far
    pub content: Vec<ContentBlock>,
    /// Tool-specific metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Whether this is the final chunk
    #[serde(default)]
    pub is_last: bool,
    /// Whether the tool stopped because it was interrupted
    #[serde(default)]
    pub is_interrupted: bool,
}

impl ToolChunk {
    /// A final text chunk
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            metadata: HashMap::new(),
            is_last: true,
            is_interrupted: false,
        }
    }

    /// A non-final text chunk
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            is_last: false,
            ..Self::text(text)
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
