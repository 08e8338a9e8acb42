//! Caller-side stub of the remote call surface

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::placeholder::{PlaceholderMessage, PlaceholderRef, ResultFetcher};
use super::protocol::{
    self, methods, AgentCall, AgentIdRequest, AgentListResponse, AgentMemoryResponse,
    CallAgentFuncRequest, CallAgentFuncResponse, CloneAgentResponse, CreateAgentRequest,
    DeleteAgentsRequest, Empty, ErrorBody, GetResultRequest, GetResultResponse, MessageEnvelope,
    ServerInfo, StatusResponse,
};
use super::{RpcError, RpcResult};
use crate::agents::domain::{AgentInfo, Message};
use crate::config::ClientSettings;

/// Client of one server; cheap to clone, connections are pooled
#[derive(Clone)]
pub struct RpcClient {
    host: String,
    port: u16,
    base_url: String,
    http: reqwest::Client,
    settings: ClientSettings,
}

impl RpcClient {
    pub fn new(host: &str, port: u16) -> RpcResult<Self> {
        Self::with_settings(host, port, ClientSettings::default())
    }

    pub fn with_settings(host: &str, port: u16, settings: ClientSettings) -> RpcResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self {
            host: host.to_string(),
            port,
            base_url: format!("http://{}:{}", host, port),
            http,
            settings,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> RpcResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, protocol::method_path(method));
        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) => RpcError::from_status(error.status, error.message),
            Err(_) if status == StatusCode::PAYLOAD_TOO_LARGE => RpcError::ResourceExhausted(body),
            Err(_) => RpcError::Internal(format!("{} returned {}: {}", method, status, body)),
        })
    }

    /// Liveness check; unreachable servers are simply not alive
    pub async fn is_alive(&self) -> bool {
        match self.call::<_, StatusResponse>(methods::IS_ALIVE, &Empty {}).await {
            Ok(response) => response.ok,
            Err(e) => {
                debug!(host = %self.host, port = self.port, error = %e, "Server not reachable");
                false
            }
        }
    }

    /// Ask the server to shut down
    pub async fn stop(&self) -> RpcResult<()> {
        let response: StatusResponse = self.call(methods::STOP, &Empty {}).await?;
        ensure_ok(response)
    }

    pub async fn create_agent(&self, agent_id: &str, agent_class: &str, args: Value) -> RpcResult<()> {
        let request = CreateAgentRequest {
            agent_id: agent_id.to_string(),
            agent_class: agent_class.to_string(),
            args,
        };
        let response: StatusResponse = self.call(methods::CREATE_AGENT, &request).await?;
        ensure_ok(response)
    }

    pub async fn delete_agents(&self, agent_ids: &[String]) -> RpcResult<()> {
        let request = DeleteAgentsRequest {
            agent_ids: agent_ids.to_vec(),
        };
        let response: StatusResponse = self.call(methods::DELETE_AGENTS, &request).await?;
        ensure_ok(response)
    }

    pub async fn delete_all_agents(&self) -> RpcResult<()> {
        let response: StatusResponse = self.call(methods::DELETE_ALL_AGENTS, &Empty {}).await?;
        ensure_ok(response)
    }

    /// Clone an agent on the server; fails when the server reports no new id
    pub async fn clone_agent(&self, agent_id: &str) -> RpcResult<String> {
        let request = AgentIdRequest {
            agent_id: agent_id.to_string(),
        };
        let response: CloneAgentResponse = self.call(methods::CLONE_AGENT, &request).await?;
        response
            .new_agent_ids
            .into_iter()
            .next()
            .ok_or_else(|| RpcError::InvalidArgument(format!("failed to clone agent {}", agent_id)))
    }

    /// Start a reply; returns at once with a placeholder for the result
    pub async fn reply(&self, agent_id: &str, message: Option<Message>) -> RpcResult<PlaceholderMessage> {
        let request = CallAgentFuncRequest {
            agent_id: agent_id.to_string(),
            call: AgentCall::Reply {
                message: message.map(MessageEnvelope::new),
            },
        };
        let response: CallAgentFuncResponse = self.call(methods::CALL_AGENT_FUNC, &request).await?;
        let reference_msg = response
            .message
            .ok_or_else(|| RpcError::Protocol("reply returned no task reference".to_string()))?
            .into_message()?;
        let reference = PlaceholderRef::from_message(&reference_msg)
            .ok_or_else(|| RpcError::Protocol("reply returned no task reference".to_string()))?;

        Ok(PlaceholderMessage::new(
            reference_msg.name,
            reference,
            Arc::new(self.clone()),
        ))
    }

    pub async fn observe(&self, agent_id: &str, messages: Vec<Message>) -> RpcResult<()> {
        let request = CallAgentFuncRequest {
            agent_id: agent_id.to_string(),
            call: AgentCall::Observe {
                messages: messages.into_iter().map(MessageEnvelope::new).collect(),
            },
        };
        let _: CallAgentFuncResponse = self.call(methods::CALL_AGENT_FUNC, &request).await?;
        Ok(())
    }

    /// Poll until the task result is ready or the configured maximum wait passes
    pub async fn get_result(&self, task_id: u64) -> RpcResult<Message> {
        let deadline = Instant::now() + Duration::from_secs(self.settings.max_timeout_seconds);
        let request = GetResultRequest { task_id };
        loop {
            let response: GetResultResponse = self.call(methods::GET_RESULT, &request).await?;
            if let (true, Some(envelope)) = (response.ready, response.message) {
                return envelope.into_message();
            }
            if Instant::now() >= deadline {
                return Err(RpcError::Timeout(format!("result of task {}", task_id)));
            }
            tokio::time::sleep(Duration::from_millis(self.settings.poll_interval_ms)).await;
        }
    }

    pub async fn get_agent_list(&self) -> RpcResult<Vec<AgentInfo>> {
        let response: AgentListResponse = self.call(methods::GET_AGENT_LIST, &Empty {}).await?;
        Ok(response.agents)
    }

    pub async fn get_server_info(&self) -> RpcResult<ServerInfo> {
        self.call(methods::GET_SERVER_INFO, &Empty {}).await
    }

    pub async fn get_agent_memory(&self, agent_id: &str) -> RpcResult<Vec<Message>> {
        let request = AgentIdRequest {
            agent_id: agent_id.to_string(),
        };
        let response: AgentMemoryResponse = self.call(methods::GET_AGENT_MEMORY, &request).await?;
        protocol::unwrap_all(response.messages)
    }
}

#[async_trait]
impl ResultFetcher for RpcClient {
    async fn fetch_result(&self, task_id: u64) -> RpcResult<Message> {
        self.get_result(task_id).await
    }
}

fn ensure_ok(response: StatusResponse) -> RpcResult<()> {
    if response.ok {
        Ok(())
    } else {
        Err(RpcError::InvalidArgument(
            response.message.unwrap_or_else(|| "request rejected".to_string()),
        ))
    }
}
