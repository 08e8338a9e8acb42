//! Configuration types for agents

use serde::{Deserialize, Serialize};

/// Configuration for a ReAct agent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReActAgentConfig {
    /// Agent name, used as the sender name of its replies
    pub name: String,
    /// System prompt prepended to every model call
    #[serde(default = "default_sys_prompt")]
    pub sys_prompt: String,
    /// Named model to resolve through the agent factory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Named tools to resolve through the agent factory
    #[serde(default)]
    pub tools: Vec<String>,
    /// Maximum reasoning-acting rounds before summarizing
    #[serde(default = "default_max_iters")]
    pub max_iters: u32,
    /// Run the tool calls of one round concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,
    /// Stream model output, printing each chunk
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Short-term memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// What happens to memory after an interrupted reply
    #[serde(default)]
    pub interrupt_policy: InterruptPolicy,
    /// How long-term memory, when attached, is driven
    #[serde(default)]
    pub long_term_memory_mode: LongTermMemoryMode,
}

fn default_sys_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_max_iters() -> u32 {
    10
}

fn default_stream() -> bool {
    true
}

impl ReActAgentConfig {
    /// Config with defaults for everything but the name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sys_prompt: default_sys_prompt(),
            model: None,
            tools: Vec::new(),
            max_iters: default_max_iters(),
            parallel_tool_calls: false,
            stream: default_stream(),
            memory: MemoryConfig::default(),
            interrupt_policy: InterruptPolicy::default(),
            long_term_memory_mode: LongTermMemoryMode::default(),
        }
    }
}

/// Memory configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Strategy applied when formatting memory into a prompt
    #[serde(default)]
    pub strategy: MemoryStrategy,
    /// Maximum number of messages to retain; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
}

/// Memory management strategies
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryStrategy {
    /// Keep all messages
    #[default]
    Full,
    /// Sliding window of most recent messages
    SlidingWindow {
        /// Number of messages to keep
        size: usize,
    },
    /// Keep first N messages + last M messages
    FirstLast {
        /// Number of initial messages to keep
        first: usize,
        /// Number of recent messages to keep
        last: usize,
    },
}

/// Memory handling after an interrupted reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPolicy {
    /// Drop the whole conversation once the interruption is acknowledged
    #[default]
    ClearMemory,
    /// Keep history up to and including the acknowledgment
    PreserveMemory,
}

/// Who drives long-term memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LongTermMemoryMode {
    /// The agent retrieves before and records after every reply
    #[default]
    StaticControl,
    /// The model drives memory through tools
    AgentControl,
    /// Both of the above
    Both,
}

impl LongTermMemoryMode {
    pub fn static_control(&self) -> bool {
        matches!(self, Self::StaticControl | Self::Both)
    }

    pub fn agent_control(&self) -> bool {
        matches!(self, Self::AgentControl | Self::Both)
    }
}
