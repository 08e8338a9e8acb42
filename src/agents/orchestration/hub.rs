//! Message hub
//!
//! While a hub is open every participant is subscribed to every other
//! participant under the hub's own subscriber group, so a reply produced by
//! `call` reaches the rest of the room. Closing the hub (explicitly or by
//! dropping it) removes that group again and leaves other groups intact.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::agents::core::{Agent, AgentExt};
use crate::agents::domain::Message;
use crate::agents::error::AgentError;

pub struct MsgHub {
    name: String,
    participants: Vec<Arc<dyn Agent>>,
    auto_broadcast: bool,
    open: bool,
}

impl MsgHub {
    pub fn new(participants: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: format!("hub-{}", uuid::Uuid::new_v4().simple()),
            participants,
            auto_broadcast: true,
            open: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// When disabled, replies are only shared through [`MsgHub::broadcast`]
    pub fn with_auto_broadcast(mut self, enabled: bool) -> Self {
        self.auto_broadcast = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn participants(&self) -> &[Arc<dyn Agent>] {
        &self.participants
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open the hub, delivering `announcement` to every participant
    ///
    /// Returns the participants that failed to observe the announcement.
    pub async fn enter(&mut self, announcement: Vec<Message>) -> Vec<(String, AgentError)> {
        self.open = true;
        if self.auto_broadcast {
            self.reset();
        }
        if announcement.is_empty() {
            return Vec::new();
        }
        self.broadcast(announcement).await
    }

    /// Close the hub; a no-op once closed
    pub fn exit(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if self.auto_broadcast {
            for participant in &self.participants {
                participant.base().remove_hub_subscribers(&self.name);
            }
        }
    }

    pub fn add(&mut self, agents: Vec<Arc<dyn Agent>>) {
        for agent in agents {
            let known = self
                .participants
                .iter()
                .any(|p| p.base().id() == agent.base().id());
            if !known {
                self.participants.push(agent);
            }
        }
        if self.open && self.auto_broadcast {
            self.reset();
        }
    }

    /// Remove participants by agent id
    pub fn delete(&mut self, agent_ids: &[&str]) {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.participants)
            .into_iter()
            .partition(|p| agent_ids.contains(&p.base().id()));
        for id in agent_ids {
            if !removed.iter().any(|p| p.base().id() == *id) {
                warn!(hub = %self.name, agent_id = %id, "Cannot delete agent that is not in the hub");
            }
        }
        for agent in &removed {
            agent.base().remove_hub_subscribers(&self.name);
        }
        self.participants = kept;
        if self.open && self.auto_broadcast {
            self.reset();
        }
    }

    /// Deliver messages to every participant
    ///
    /// A failing participant does not stop delivery to the rest; failures
    /// are logged and returned as (agent id, error) pairs.
    pub async fn broadcast(&self, msgs: Vec<Message>) -> Vec<(String, AgentError)> {
        let mut failures = Vec::new();
        for participant in &self.participants {
            if let Err(e) = participant.observe(msgs.clone()).await {
                let agent_id = participant.base().id().to_string();
                warn!(hub = %self.name, agent_id = %agent_id, error = %e, "Participant failed to observe broadcast");
                failures.push((agent_id, e));
            }
        }
        failures
    }

    fn reset(&self) {
        debug!(hub = %self.name, participants = self.participants.len(), "Wiring hub subscribers");
        for participant in &self.participants {
            // The subscriber list filters the participant itself out
            participant
                .base()
                .reset_hub_subscribers(&self.name, &self.participants);
        }
    }
}

impl Drop for MsgHub {
    fn drop(&mut self) {
        self.exit();
    }
}

impl std::fmt::Debug for MsgHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgHub")
            .field("name", &self.name)
            .field("participants", &self.participants.len())
            .field("open", &self.open)
            .finish()
    }
}
