//! Agent descriptor types

use serde::{Deserialize, Serialize};

/// Agent information returned from list operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Unique agent id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Registered agent type name
    #[serde(rename = "type")]
    pub type_name: String,
}
