#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use troupe::agents::core::{ReActAgent, FINISH_FUNCTION_NAME};
use troupe::agents::domain::{ContentBlock, ToolChunk};
use troupe::agents::llm::{CompletionResponse, ScriptedModel};
use troupe::agents::tools::{FnTool, Toolkit};
use troupe::agents::{Agent, ReActAgentConfig};
use troupe::config::Settings;

/// Loopback server settings with short waits, on a free port
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.host = "127.0.0.1".to_string();
    settings.server.port = None;
    settings.server.capacity = 2;
    settings.server.shutdown_grace_seconds = 2;
    settings.server.result_wait_ms = 200;
    settings.client.poll_interval_ms = 20;
    settings.client.max_timeout_seconds = 10;
    settings
}

pub fn finish(id: &str, input: Value) -> ContentBlock {
    ContentBlock::tool_use(id, FINISH_FUNCTION_NAME, input)
}

pub fn finish_with(id: &str, response: &str) -> ContentBlock {
    finish(id, json!({ "response": response }))
}

/// A tool that answers `42`, optionally after a delay
pub fn lookup_tool(delay: Option<Duration>) -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "lookup",
        "Look up the answer",
        json!({"type": "object", "properties": {}}),
        move |_input| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(ToolChunk::text("42"))
        },
    ))
}

pub fn react_config(name: &str) -> ReActAgentConfig {
    let mut config = ReActAgentConfig::new(name);
    config.stream = false;
    config
}

/// A quiet ReAct agent over a scripted model, returning both
pub fn react_agent(
    config: ReActAgentConfig,
    responses: Vec<CompletionResponse>,
    toolkit: Toolkit,
) -> (Arc<ReActAgent>, Arc<ScriptedModel>) {
    let model = Arc::new(ScriptedModel::new("scripted", responses));
    let agent = ReActAgent::new(config, model.clone(), toolkit);
    agent.base().disable_console_output();
    (Arc::new(agent), model)
}
