use std::collections::HashSet;
use thiserror::Error;

use crate::config::{AgentDeployment, ServerSettings, Settings};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_server(&settings.server) {
            errors.extend(e);
        }

        if settings.client.poll_interval_ms == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "client.poll_interval_ms".to_string(),
                reason: "Poll interval must be greater than 0".to_string(),
            });
        }

        if let Err(e) = Self::validate_agents(&settings.agents) {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(server: &ServerSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if server.host.is_empty() {
            errors.push(ValidationError::MissingField("server.host".to_string()));
        }

        for (field, value) in [
            ("server.capacity", server.capacity),
            ("server.max_pool_size", server.max_pool_size),
            ("server.max_message_size", server.max_message_size),
        ] {
            if value == 0 {
                errors.push(ValidationError::InvalidValue {
                    field: field.to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        if server.max_expire_time == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "server.max_expire_time".to_string(),
                reason: "Results must be kept for at least one second".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_agents(agents: &[AgentDeployment]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut ids = HashSet::new();

        for agent in agents {
            if agent.id.is_empty() {
                errors.push(ValidationError::MissingField("agents.id".to_string()));
            }
            if agent.class.is_empty() {
                errors.push(ValidationError::MissingField(format!(
                    "agents[{}].class",
                    agent.id
                )));
            }
            if !agent.args.is_object() {
                errors.push(ValidationError::InvalidValue {
                    field: format!("agents[{}].args", agent.id),
                    reason: "Constructor arguments must be a table".to_string(),
                });
            }
            if !ids.insert(agent.id.as_str()) {
                errors.push(ValidationError::Duplicate(format!("Agent id: {}", agent.id)));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
