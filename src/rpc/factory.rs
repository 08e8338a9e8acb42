//! Agent types a server can construct
//!
//! Remote creation only names a registered class and passes JSON constructor
//! arguments; no code crosses the wire. Models and tools are registered by
//! name so that constructor arguments can refer to them.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::config::ReActAgentConfig;
use crate::agents::core::{Agent, AgentBase, EchoAgent, ReActAgent, UserAgent};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::hooks::AgentClass;
use crate::agents::llm::ChatModel;
use crate::agents::memory::InMemoryLongTermMemory;
use crate::agents::tools::{Toolkit, ToolFunction};

/// Builds an agent from (factory, agent id, constructor arguments)
pub type AgentConstructor =
    Arc<dyn Fn(&AgentFactory, &str, &Value) -> AgentResult<Arc<dyn Agent>> + Send + Sync>;

#[derive(Default)]
pub struct AgentFactory {
    constructors: HashMap<String, AgentConstructor>,
    models: HashMap<String, Arc<dyn ChatModel>>,
    tools: HashMap<String, Arc<dyn ToolFunction>>,
}

#[derive(Deserialize)]
struct NamedArgs {
    #[serde(default)]
    name: Option<String>,
}

fn agent_name(agent_id: &str, args: &Value) -> AgentResult<String> {
    if args.is_null() {
        return Ok(agent_id.to_string());
    }
    let args: NamedArgs = serde_json::from_value(args.clone())
        .map_err(|e| AgentError::Configuration(format!("invalid constructor arguments: {}", e)))?;
    Ok(args.name.unwrap_or_else(|| agent_id.to_string()))
}

impl AgentFactory {
    /// Empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory knowing EchoAgent, UserAgent and ReActAgent
    pub fn with_builtin_agents() -> Self {
        let mut factory = Self::new();

        factory.register_agent(
            EchoAgent::TYPE_NAME,
            Arc::new(|_, agent_id, args| {
                let base = AgentBase::new(agent_name(agent_id, args)?).with_id(agent_id);
                Ok(Arc::new(EchoAgent::with_base(base)) as Arc<dyn Agent>)
            }),
        );

        factory.register_agent(
            UserAgent::TYPE_NAME,
            Arc::new(|_, agent_id, args| {
                let agent = UserAgent::new(agent_name(agent_id, args)?).with_id(agent_id);
                Ok(Arc::new(agent) as Arc<dyn Agent>)
            }),
        );

        factory.register_agent(
            ReActAgent::TYPE_NAME,
            Arc::new(|factory, agent_id, args| {
                factory
                    .build_react_agent(agent_id, args)
                    .map(|agent| Arc::new(agent) as Arc<dyn Agent>)
            }),
        );

        factory
    }

    /// Register (or replace) a constructible agent class
    pub fn register_agent(&mut self, class: impl Into<String>, constructor: AgentConstructor) {
        self.constructors.insert(class.into(), constructor);
    }

    pub fn register_model(&mut self, name: impl Into<String>, model: Arc<dyn ChatModel>) {
        self.models.insert(name.into(), model);
    }

    pub fn register_tool(&mut self, tool: Arc<dyn ToolFunction>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Registered class names, sorted
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.constructors.keys().cloned().collect();
        classes.sort();
        classes
    }

    pub fn model(&self, name: &str) -> AgentResult<Arc<dyn ChatModel>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::Configuration(format!("Unknown model: {}", name)))
    }

    /// Toolkit holding the named tools, in the order given
    pub fn toolkit(&self, names: &[String]) -> AgentResult<Toolkit> {
        let mut toolkit = Toolkit::new();
        for name in names {
            let tool = self
                .tools
                .get(name)
                .ok_or_else(|| AgentError::Configuration(format!("Unknown tool: {}", name)))?;
            toolkit.register(tool.clone());
        }
        Ok(toolkit)
    }

    /// Construct an agent of a registered class
    pub fn create(&self, class: &str, agent_id: &str, args: &Value) -> AgentResult<Arc<dyn Agent>> {
        let constructor = self
            .constructors
            .get(class)
            .ok_or_else(|| AgentError::NotFound(format!("agent class {}", class)))?;
        constructor(self, agent_id, args)
    }

    fn build_react_agent(&self, agent_id: &str, args: &Value) -> AgentResult<ReActAgent> {
        let mut args = match args {
            Value::Object(map) => map.clone(),
            Value::Null => Default::default(),
            _ => {
                return Err(AgentError::Configuration(
                    "constructor arguments must be an object".to_string(),
                ))
            }
        };
        let long_term_memory = args
            .remove("long_term_memory")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        args.entry("name")
            .or_insert_with(|| Value::String(agent_id.to_string()));

        let config: ReActAgentConfig = serde_json::from_value(Value::Object(args))
            .map_err(|e| AgentError::Configuration(format!("invalid ReActAgent arguments: {}", e)))?;
        let model_name = config.model.clone().ok_or_else(|| {
            AgentError::Configuration("ReActAgent requires a model".to_string())
        })?;
        let model = self.model(&model_name)?;
        let toolkit = self.toolkit(&config.tools)?;

        let mut agent = ReActAgent::new(config, model, toolkit).with_id(agent_id);
        if long_term_memory {
            agent = agent.with_long_term_memory(Arc::new(InMemoryLongTermMemory::new()));
        }
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::core::AgentExt;
    use crate::agents::domain::{Message, ToolChunk};
    use crate::agents::llm::{CompletionResponse, ScriptedModel};
    use crate::agents::tools::FnTool;
    use serde_json::json;

    fn factory() -> AgentFactory {
        let mut factory = AgentFactory::with_builtin_agents();
        factory.register_model(
            "stub",
            Arc::new(ScriptedModel::repeating("stub", CompletionResponse::text("ok"))),
        );
        factory.register_tool(Arc::new(FnTool::new(
            "clock",
            "Current time",
            json!({"type": "object"}),
            |_| async { Ok(ToolChunk::text("noon")) },
        )));
        factory
    }

    #[tokio::test]
    async fn test_echo_defaults_name_to_id() {
        let agent = factory().create("EchoAgent", "a1", &json!({})).unwrap();
        assert_eq!(agent.base().id(), "a1");
        assert_eq!(agent.base().name(), "a1");
        agent.base().disable_console_output();
        let reply = agent.call(Some(Message::user("hi"))).await.unwrap();
        assert_eq!(reply.get_text_content().as_deref(), Some("echo: hi"));
    }

    #[test]
    fn test_react_resolves_model_and_tools() {
        let factory = factory();
        let agent = factory
            .create(
                "ReActAgent",
                "r1",
                &json!({"name": "friday", "model": "stub", "tools": ["clock"]}),
            )
            .unwrap();
        assert_eq!(agent.info().type_name, "ReActAgent");
        assert_eq!(agent.base().name(), "friday");

        let missing_model = factory.create("ReActAgent", "r2", &json!({}));
        assert!(matches!(missing_model, Err(AgentError::Configuration(_))));
        let unknown_tool = factory.create("ReActAgent", "r3", &json!({"model": "stub", "tools": ["nope"]}));
        assert!(matches!(unknown_tool, Err(AgentError::Configuration(_))));
    }

    #[test]
    fn test_missing_args_read_as_empty() {
        let factory = factory();
        let echo = factory.create("EchoAgent", "e1", &Value::Null).unwrap();
        assert_eq!(echo.base().name(), "e1");
        let user = factory.create("UserAgent", "u1", &Value::Null).unwrap();
        assert_eq!(user.base().name(), "u1");
        assert!(factory.create("EchoAgent", "e2", &json!("echo")).is_err());
    }

    #[test]
    fn test_unknown_class() {
        let result = factory().create("ShellAgent", "x", &json!({}));
        assert!(matches!(result, Err(AgentError::NotFound(_))));
        assert_eq!(factory().classes(), vec!["EchoAgent", "ReActAgent", "UserAgent"]);
    }
}
