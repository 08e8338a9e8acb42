//! Local proxy of an agent hosted by a server

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::placeholder::PlaceholderMessage;
use super::{RpcClient, RpcResult};
use crate::agents::core::{Agent, AgentBase};
use crate::agents::domain::Message;
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::hooks::{AgentClass, HookType, BASE_HOOK_TYPES};

/// Forwards `reply` and `observe` to a remote agent with the same id
///
/// Hooks registered on the proxy run locally around the forwarded call;
/// the remote agent runs its own.
pub struct RpcAgent {
    base: AgentBase,
    client: RpcClient,
    class: String,
    args: Value,
}

impl RpcAgent {
    /// Create a remote agent of `class` and return its proxy
    pub async fn create(client: RpcClient, class: &str, args: Value) -> RpcResult<Self> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(class)
            .to_string();
        let base = AgentBase::new(name);
        client.create_agent(base.id(), class, args.clone()).await?;
        info!(agent_id = %base.id(), class, server_port = client.port(), "Created remote agent");

        Ok(Self {
            base,
            client,
            class: class.to_string(),
            args,
        })
    }

    /// Proxy for an agent that already exists on the server
    pub fn attach(client: RpcClient, agent_id: &str, name: &str, class: &str) -> Self {
        Self {
            base: AgentBase::new(name).with_id(agent_id),
            client,
            class: class.to_string(),
            args: Value::Null,
        }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Remote class this proxy was created with
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Start a remote reply without waiting for it
    pub async fn reply_placeholder(&self, msg: Option<Message>) -> RpcResult<PlaceholderMessage> {
        self.client.reply(self.base.id(), msg).await
    }

    /// Clone the remote agent `n` times; each clone gets its own proxy
    pub async fn clone_instances(&self, n: usize) -> RpcResult<Vec<RpcAgent>> {
        let mut clones = Vec::with_capacity(n);
        for _ in 0..n {
            let new_id = self.client.clone_agent(self.base.id()).await?;
            debug!(source = %self.base.id(), clone = %new_id, "Cloned remote agent");
            clones.push(Self {
                base: AgentBase::new(self.base.name()).with_id(new_id),
                client: self.client.clone(),
                class: self.class.clone(),
                args: self.args.clone(),
            });
        }
        Ok(clones)
    }

    /// Delete the remote agent
    pub async fn close(&self) -> RpcResult<()> {
        self.client.delete_agents(&[self.base.id().to_string()]).await
    }
}

impl AgentClass for RpcAgent {
    const TYPE_NAME: &'static str = "RpcAgent";
    const SUPPORTED_HOOK_TYPES: &'static [HookType] = BASE_HOOK_TYPES;
}

#[async_trait]
impl Agent for RpcAgent {
    fn base(&self) -> &AgentBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    async fn reply_impl(&self, msg: Option<Message>, _structured_model: Option<Value>) -> AgentResult<Message> {
        let placeholder = self.reply_placeholder(msg).await?;
        self.base
            .cancellable(async move { placeholder.into_message().await.map_err(AgentError::from) })
            .await
    }

    async fn observe_impl(&self, msgs: Vec<Message>) -> AgentResult<()> {
        self.client.observe(self.base.id(), msgs).await?;
        Ok(())
    }
}
