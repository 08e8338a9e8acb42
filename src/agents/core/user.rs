//! User agent: relays human input into the conversation

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

use super::{Agent, AgentBase, AgentExt};
use crate::agents::domain::{Message, Role};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::hooks::{AgentClass, HookType, BASE_HOOK_TYPES};

/// Where a user agent reads its input from
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Read one line of input; `None` at end of input
    async fn read_line(&self, prompt: &str) -> AgentResult<Option<String>>;
}

/// Reads lines from the process stdin
pub struct StdinInput {
    reader: Mutex<BufReader<Stdin>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputSource for StdinInput {
    async fn read_line(&self, prompt: &str) -> AgentResult<Option<String>> {
        {
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{}", prompt)?;
            stdout.flush()?;
        }
        let mut line = String::new();
        let read = self.reader.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Turns a line of human input into a user message
pub struct UserAgent {
    base: AgentBase,
    input: Arc<dyn InputSource>,
}

impl UserAgent {
    /// User agent reading from stdin
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_input(name, Arc::new(StdinInput::new()))
    }

    pub fn with_input(name: impl Into<String>, input: Arc<dyn InputSource>) -> Self {
        Self {
            base: AgentBase::new(name),
            input,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.base = self.base.with_id(id);
        self
    }
}

impl AgentClass for UserAgent {
    const TYPE_NAME: &'static str = "UserAgent";
    const SUPPORTED_HOOK_TYPES: &'static [HookType] = BASE_HOOK_TYPES;
}

#[async_trait]
impl Agent for UserAgent {
    fn base(&self) -> &AgentBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    async fn reply_impl(&self, _msg: Option<Message>, structured_model: Option<Value>) -> AgentResult<Message> {
        let prompt = format!("{}: ", self.base.name());
        let line = self
            .base
            .cancellable(self.input.read_line(&prompt))
            .await?
            .ok_or_else(|| AgentError::Execution("input closed".to_string()))?;

        let mut reply = Message::text(self.base.name(), Role::User, line.clone());
        if let Some(schema) = structured_model {
            // Structured input is typed as JSON by the human
            let value: Value = serde_json::from_str(&line)
                .map_err(|e| AgentError::Validation(format!("input is not valid JSON: {}", e)))?;
            crate::agents::schema::validate(&value, &schema).map_err(AgentError::Validation)?;
            if let Value::Object(fields) = value {
                reply.metadata.extend(fields);
            }
        }

        self.print(&reply, true).await?;
        self.base.memory().add(vec![reply.clone()]).await?;
        Ok(reply)
    }
}
