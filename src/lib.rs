//! # Troupe - multi-agent runtime
//!
//! Troupe runs conversational agents that exchange [`Message`]s. Every agent
//! operation runs through a pre/post hook chain, a reply can be interrupted,
//! and replies are broadcast to subscribed agents.
//!
//! ## Features
//!
//! - **Hooks**: class- and instance-scope interception of reply, observe and print
//! - **ReAct**: reasoning/acting loop with tool calls and a finish function
//! - **Orchestration**: message hubs and sequential/fanout pipelines
//! - **Remote agents**: host agents on a server; `reply` returns a placeholder
//!   that resolves on first access
//! - **Metrics**: Prometheus metrics of the server
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use troupe::agents::core::{AgentExt, EchoAgent};
//! use troupe::agents::Message;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let agent = EchoAgent::new("echo");
//!     let reply = agent.call(Some(Message::user("hello"))).await?;
//!     assert_eq!(reply.get_text_content().as_deref(), Some("echo: hello"));
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - **agents**: messages, hooks, the execution core, ReAct, memory, tools
//! - **rpc**: server, client, placeholder and launcher
//! - **config**: settings from file, environment and CLI
//! - **cli**: `troupe start|stop|status`

pub mod agents;
pub mod cli;
pub mod config;
pub mod rpc;

pub use agents::Message;
