//! Domain types for the agent runtime
//!
//! Core data exchanged between agents, tools and the RPC layer.

mod agent;
mod message;
mod tool_call;

pub use agent::*;
pub use message::*;
pub use tool_call::*;
