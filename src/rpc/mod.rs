//! Remote agent hosting
//!
//! A server hosts agents behind an HTTP/JSON call surface; clients create
//! agents there and talk to them through [`RpcAgent`] proxies. `reply`
//! returns at once with a task id; the result is fetched later through a
//! [`PlaceholderMessage`].
//!
//! - `protocol`: request/response types and the message envelope
//! - `result_pool`: bounded, expiring store of task results
//! - `servicer`: agent pool, worker pool and the operations behind each call
//! - `server`: axum router, port selection and serving
//! - `client`: reqwest stub for every call
//! - `placeholder`: resolve-once handle on a pending reply
//! - `factory`: the fixed set of agent types a server can construct
//! - `launcher`: runs a server in this process or as a child process

mod agent;
mod client;
mod factory;
mod launcher;
mod metrics;
mod placeholder;
pub mod protocol;
mod result_pool;
mod server;
mod servicer;

pub use agent::RpcAgent;
pub use client::RpcClient;
pub use factory::{AgentConstructor, AgentFactory};
pub use launcher::{LaunchMode, LaunchedServer, ServerLauncher, READY_MARKER};
pub use metrics::RpcMetrics;
pub use placeholder::{resolve_wire_message, PlaceholderMessage, PlaceholderRef, ResultFetcher};
pub use result_pool::ResultPool;
pub use server::{bind_listener, router, RpcServer};
pub use servicer::AgentServicer;

use thiserror::Error;

use crate::agents::error::AgentError;
use protocol::ErrorStatus;

/// Errors of the remote call layer
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request named something the server does not have or cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The task result is unknown or was evicted
    #[error("Not found: {0}")]
    NotFound(String),

    /// A size or capacity limit was hit
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The server failed while handling the call
    #[error("Remote internal error: {0}")]
    Internal(String),

    /// Connection refused, reset, or request timeout
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Waiting for a result took longer than allowed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Payload could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server could not be bound, started or stopped
    #[error("Server error: {0}")]
    Server(String),
}

impl RpcError {
    /// Status reported on the wire for this error
    pub fn status(&self) -> ErrorStatus {
        match self {
            RpcError::InvalidArgument(_) | RpcError::Protocol(_) => ErrorStatus::InvalidArgument,
            RpcError::NotFound(_) => ErrorStatus::NotFound,
            RpcError::ResourceExhausted(_) => ErrorStatus::ResourceExhausted,
            _ => ErrorStatus::Internal,
        }
    }

    /// Rebuild the error a server reported
    pub fn from_status(status: ErrorStatus, message: String) -> Self {
        match status {
            ErrorStatus::InvalidArgument => RpcError::InvalidArgument(message),
            ErrorStatus::NotFound => RpcError::NotFound(message),
            ErrorStatus::ResourceExhausted => RpcError::ResourceExhausted(message),
            ErrorStatus::Internal => RpcError::Internal(message),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Server(err.to_string())
    }
}

impl From<RpcError> for AgentError {
    fn from(err: RpcError) -> Self {
        AgentError::Remote(err.to_string())
    }
}

/// Result type alias for remote calls
pub type RpcResult<T> = Result<T, RpcError>;
