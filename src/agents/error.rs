//! Error types for the agent runtime

use thiserror::Error;

use super::hooks::HookType;

/// Errors that can occur during agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent not found
    #[error("Agent not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Hook registry or hook execution error
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// Memory error
    #[error("Memory error: {0}")]
    Memory(String),

    /// Execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// The in-flight reply was interrupted
    #[error("Operation was cancelled")]
    Cancelled,

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote agent error
    #[error("Remote error: {0}")]
    Remote(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Whether this error is the cooperative cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}

/// Errors a chat model reports
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

/// Errors raised by the hook registry and hook chain
#[derive(Debug, Error)]
pub enum HookError {
    /// The agent type does not declare this hook type
    #[error("Hook type '{hook_type}' is not supported by {type_name}")]
    Unsupported {
        hook_type: HookType,
        type_name: String,
    },

    /// No hook with that name in the (scope, hook type) bucket
    #[error("Hook '{name}' not found for '{hook_type}'")]
    NotFound { hook_type: HookType, name: String },

    /// A pre hook was registered for a post slot or the other way round
    #[error("Hook '{name}' does not match hook type '{hook_type}'")]
    KindMismatch { hook_type: HookType, name: String },

    /// Call arguments could not be bound to the operation's parameters
    #[error("Argument binding failed for {operation}: {reason}")]
    Binding { operation: String, reason: String },

    /// A hook returned an error
    #[error("Hook '{name}' failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Internal(format!("IO error: {}", err))
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
