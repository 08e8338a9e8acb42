//! Multi-agent orchestration
//!
//! - `MsgHub`: participants hear each other's replies while the hub is open
//! - `sequential_pipeline`: each agent replies to the previous reply
//! - `fanout_pipeline`: every agent replies to the same input

mod hub;
mod pipeline;

pub use hub::MsgHub;
pub use pipeline::{fanout_pipeline, sequential_pipeline};
