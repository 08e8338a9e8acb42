//! Echo agent

use async_trait::async_trait;
use serde_json::Value;

use super::{Agent, AgentBase, AgentExt};
use crate::agents::domain::Message;
use crate::agents::error::AgentResult;
use crate::agents::hooks::{AgentClass, HookType, BASE_HOOK_TYPES};

/// Replies `echo: <text>` to whatever it receives, remembering both sides
pub struct EchoAgent {
    base: AgentBase,
}

impl EchoAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: AgentBase::new(name),
        }
    }

    pub fn with_base(base: AgentBase) -> Self {
        Self { base }
    }
}

impl AgentClass for EchoAgent {
    const TYPE_NAME: &'static str = "EchoAgent";
    const SUPPORTED_HOOK_TYPES: &'static [HookType] = BASE_HOOK_TYPES;
}

#[async_trait]
impl Agent for EchoAgent {
    fn base(&self) -> &AgentBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    async fn reply_impl(&self, msg: Option<Message>, _structured_model: Option<Value>) -> AgentResult<Message> {
        let text = msg
            .as_ref()
            .and_then(Message::get_text_content)
            .unwrap_or_default();
        if let Some(msg) = msg {
            self.base.memory().add(vec![msg]).await?;
        }

        let reply = Message::assistant(self.base.name(), format!("echo: {}", text));
        self.speak(&reply).await?;
        self.base.memory().add(vec![reply.clone()]).await?;
        Ok(reply)
    }
}
