//! Wire format of the remote call surface
//!
//! Every call is `POST /rpc/<method>` with a JSON body. Messages travel in a
//! versioned envelope so peers can reject payloads they do not understand.
//! Failures come back with a non-2xx status and an [`ErrorBody`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RpcError, RpcResult};
use crate::agents::domain::{AgentInfo, Message};

/// Version written into every message envelope
pub const WIRE_VERSION: u32 = 1;

/// Method names, each served at `/rpc/<name>`
pub mod methods {
    pub const IS_ALIVE: &str = "is_alive";
    pub const STOP: &str = "stop";
    pub const CREATE_AGENT: &str = "create_agent";
    pub const DELETE_AGENTS: &str = "delete_agents";
    pub const DELETE_ALL_AGENTS: &str = "delete_all_agents";
    pub const CLONE_AGENT: &str = "clone_agent";
    pub const CALL_AGENT_FUNC: &str = "call_agent_func";
    pub const GET_RESULT: &str = "get_result";
    pub const GET_AGENT_LIST: &str = "get_agent_list";
    pub const GET_SERVER_INFO: &str = "get_server_info";
    pub const GET_AGENT_MEMORY: &str = "get_agent_memory";
}

/// URL path of a method
pub fn method_path(method: &str) -> String {
    format!("/rpc/{}", method)
}

/// A message with its wire version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub version: u32,
    pub message: Message,
}

impl MessageEnvelope {
    pub fn new(message: Message) -> Self {
        Self {
            version: WIRE_VERSION,
            message,
        }
    }

    /// Unwrap the message, rejecting envelopes of another version
    pub fn into_message(self) -> RpcResult<Message> {
        if self.version != WIRE_VERSION {
            return Err(RpcError::Protocol(format!(
                "unsupported message envelope version {} (expected {})",
                self.version, WIRE_VERSION
            )));
        }
        Ok(self.message)
    }
}

impl From<Message> for MessageEnvelope {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

/// Encode a message into a standalone blob
pub fn encode_message(message: &Message) -> RpcResult<Vec<u8>> {
    Ok(serde_json::to_vec(&MessageEnvelope::new(message.clone()))?)
}

/// Decode a blob written by [`encode_message`], refusing blobs over `max_size` bytes
pub fn decode_message(blob: &[u8], max_size: usize) -> RpcResult<Message> {
    if blob.len() > max_size {
        return Err(RpcError::ResourceExhausted(format!(
            "message of {} bytes exceeds the {} byte limit",
            blob.len(),
            max_size
        )));
    }
    let envelope: MessageEnvelope = serde_json::from_slice(blob)?;
    envelope.into_message()
}

pub fn unwrap_all(envelopes: Vec<MessageEnvelope>) -> RpcResult<Vec<Message>> {
    envelopes.into_iter().map(MessageEnvelope::into_message).collect()
}

/// Wire status of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    InvalidArgument,
    NotFound,
    Internal,
    ResourceExhausted,
}

impl ErrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::InvalidArgument => "invalid_argument",
            ErrorStatus::NotFound => "not_found",
            ErrorStatus::Internal => "internal",
            ErrorStatus::ResourceExhausted => "resource_exhausted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: ErrorStatus,
    pub message: String,
}

/// Generic success flag, with a reason when `ok` is false
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    pub agent_id: String,
    pub agent_class: String,
    /// Constructor arguments understood by the agent class
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAgentsRequest {
    pub agent_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdRequest {
    pub agent_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloneAgentResponse {
    /// Empty when the clone failed
    pub new_agent_ids: Vec<String>,
}

/// The agent operation a `call_agent_func` request runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "func", rename_all = "snake_case")]
pub enum AgentCall {
    Reply {
        #[serde(default)]
        message: Option<MessageEnvelope>,
    },
    Observe {
        messages: Vec<MessageEnvelope>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAgentFuncRequest {
    pub agent_id: String,
    #[serde(flatten)]
    pub call: AgentCall,
}

/// `reply` answers with the task-id-only placeholder; `observe` with nothing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallAgentFuncResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResultRequest {
    pub task_id: u64,
}

/// `message` is set once the task finished; until then `ready` is false
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResultResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMemoryResponse {
    pub messages: Vec<MessageEnvelope>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_id: String,
    pub pid: u32,
    pub host: String,
    pub port: u16,
    pub capacity: usize,
    pub uptime_seconds: u64,
    pub agents: usize,
    pub pending_tasks: usize,
}
