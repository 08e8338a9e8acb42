//! Agent runtime
//!
//! ## Architecture
//!
//! - `domain/` - Core types (Message, content blocks, tool chunks)
//! - `hooks` - Pre/post hook registries and argument binding
//! - `core/` - Agent execution core and the provided agents (Echo, User, ReAct)
//! - `llm/` - Chat model port with streaming
//! - `memory/` - Short-term memory, strategies and long-term memory
//! - `tools` - Toolkit of callable functions
//! - `orchestration/` - MsgHub and pipelines

pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod hooks;
pub mod llm;
pub mod memory;
pub mod orchestration;
pub mod schema;
pub mod tools;

// Re-export commonly used types
pub use config::*;
pub use domain::*;
pub use error::*;
pub use self::core::{Agent, AgentBase, AgentExt};
