//! Operations behind each remote call
//!
//! Lock order: the agent pool lock and the task counter lock are never held
//! together, and neither is held across an await. Workers only touch the
//! result pool, whose lock is taken last and released immediately.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::factory::AgentFactory;
use super::metrics::RpcMetrics;
use super::placeholder::{resolve_wire_message, PlaceholderRef, PLACEHOLDER_METADATA_KEY};
use super::protocol::{
    unwrap_all, AgentCall, AgentListResponse, AgentMemoryResponse, CallAgentFuncRequest,
    CallAgentFuncResponse, CloneAgentResponse, CreateAgentRequest, GetResultResponse,
    MessageEnvelope, ServerInfo, StatusResponse,
};
use super::result_pool::ResultPool;
use super::{RpcError, RpcResult};
use crate::agents::core::{Agent, AgentExt};
use crate::agents::domain::{Message, Role};
use crate::config::{AgentDeployment, ClientSettings, ServerSettings};

struct HostedAgent {
    agent: Arc<dyn Agent>,
    class: String,
    args: Value,
}

/// Hosts agents and runs their operations for remote callers
pub struct AgentServicer {
    server_id: String,
    host: String,
    port: AtomicU16,
    capacity: usize,
    result_wait: Duration,
    factory: Arc<AgentFactory>,
    agents: Mutex<HashMap<String, HostedAgent>>,
    task_counter: Mutex<u64>,
    results: Arc<ResultPool>,
    workers: Arc<Semaphore>,
    client_settings: ClientSettings,
    metrics: Arc<RpcMetrics>,
    stop: CancellationToken,
    started: Instant,
}

impl AgentServicer {
    pub fn new(
        settings: &ServerSettings,
        client_settings: ClientSettings,
        factory: Arc<AgentFactory>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            server_id: uuid::Uuid::new_v4().simple().to_string(),
            host: settings.host.clone(),
            port: AtomicU16::new(settings.port.unwrap_or(0)),
            capacity: settings.capacity,
            result_wait: Duration::from_millis(settings.result_wait_ms),
            factory,
            agents: Mutex::new(HashMap::new()),
            task_counter: Mutex::new(0),
            results: Arc::new(ResultPool::new(
                settings.max_pool_size,
                Duration::from_secs(settings.max_expire_time),
            )),
            workers: Arc::new(Semaphore::new(settings.capacity.max(1))),
            client_settings,
            metrics: Arc::new(RpcMetrics::new()?),
            stop: CancellationToken::new(),
            started: Instant::now(),
        })
    }

    /// Record the port actually bound
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn metrics(&self) -> &RpcMetrics {
        &self.metrics
    }

    pub fn results(&self) -> &ResultPool {
        &self.results
    }

    /// Cancelled once a stop was requested
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn is_alive(&self) -> StatusResponse {
        StatusResponse::ok()
    }

    pub fn stop(&self) -> StatusResponse {
        info!(server_id = %self.server_id, "Stop requested");
        self.stop.cancel();
        StatusResponse::ok()
    }

    pub fn create_agent(&self, request: CreateAgentRequest) -> StatusResponse {
        let mut agents = self.agents.lock();
        if agents.contains_key(&request.agent_id) {
            return StatusResponse::failed(format!(
                "Agent with agent_id [{}] already exists",
                request.agent_id
            ));
        }

        match self
            .factory
            .create(&request.agent_class, &request.agent_id, &request.args)
        {
            Ok(agent) => {
                info!(agent_id = %request.agent_id, class = %request.agent_class, "Created agent");
                agents.insert(
                    request.agent_id,
                    HostedAgent {
                        agent,
                        class: request.agent_class,
                        args: request.args,
                    },
                );
                self.metrics.hosted_agents.set(agents.len() as f64);
                StatusResponse::ok()
            }
            Err(e) => {
                warn!(agent_id = %request.agent_id, class = %request.agent_class, error = %e, "Failed to create agent");
                StatusResponse::failed(e.to_string())
            }
        }
    }

    /// Create the agents listed in the server settings
    pub fn deploy(&self, deployments: &[AgentDeployment]) -> RpcResult<()> {
        for deployment in deployments {
            let response = self.create_agent(CreateAgentRequest {
                agent_id: deployment.id.clone(),
                agent_class: deployment.class.clone(),
                args: deployment.args.clone(),
            });
            if !response.ok {
                return Err(RpcError::Server(format!(
                    "cannot deploy agent {}: {}",
                    deployment.id,
                    response.message.unwrap_or_default()
                )));
            }
        }
        Ok(())
    }

    /// Remove agents; unknown ids are logged and skipped
    pub fn delete_agents(&self, agent_ids: &[String]) -> StatusResponse {
        let mut agents = self.agents.lock();
        for agent_id in agent_ids {
            match agents.remove(agent_id) {
                Some(_) => info!(agent_id = %agent_id, "Deleted agent"),
                None => warn!(agent_id = %agent_id, "Try to delete a non-existent agent"),
            }
        }
        self.metrics.hosted_agents.set(agents.len() as f64);
        StatusResponse::ok()
    }

    pub fn delete_all_agents(&self) -> StatusResponse {
        let mut agents = self.agents.lock();
        info!(count = agents.len(), "Deleting all agents");
        agents.clear();
        self.metrics.hosted_agents.set(0.0);
        StatusResponse::ok()
    }

    /// New agent built from the source agent's class and arguments
    pub fn clone_agent(&self, agent_id: &str) -> CloneAgentResponse {
        let mut agents = self.agents.lock();
        let Some(source) = agents.get(agent_id) else {
            warn!(agent_id = %agent_id, "Try to clone a non-existent agent");
            return CloneAgentResponse::default();
        };

        let new_id = uuid::Uuid::new_v4().simple().to_string();
        let class = source.class.clone();
        let args = source.args.clone();
        match self.factory.create(&class, &new_id, &args) {
            Ok(agent) => {
                info!(source = %agent_id, agent_id = %new_id, "Cloned agent");
                agents.insert(new_id.clone(), HostedAgent { agent, class, args });
                self.metrics.hosted_agents.set(agents.len() as f64);
                CloneAgentResponse {
                    new_agent_ids: vec![new_id],
                }
            }
            Err(e) => {
                error!(source = %agent_id, error = %e, "Failed to clone agent");
                CloneAgentResponse::default()
            }
        }
    }

    fn agent(&self, agent_id: &str) -> RpcResult<Arc<dyn Agent>> {
        self.agents
            .lock()
            .get(agent_id)
            .map(|hosted| hosted.agent.clone())
            .ok_or_else(|| RpcError::InvalidArgument(format!("Agent [{}] not exists", agent_id)))
    }

    pub async fn call_agent_func(
        &self,
        request: CallAgentFuncRequest,
    ) -> RpcResult<CallAgentFuncResponse> {
        let agent = self.agent(&request.agent_id)?;
        match request.call {
            AgentCall::Reply { message } => {
                let message = message.map(MessageEnvelope::into_message).transpose()?;
                let reference = self.submit_reply(agent, message);
                Ok(CallAgentFuncResponse {
                    message: Some(MessageEnvelope::new(reference)),
                })
            }
            AgentCall::Observe { messages } => {
                let mut resolved = Vec::with_capacity(messages.len());
                for message in unwrap_all(messages)? {
                    resolved.push(resolve_wire_message(message, &self.client_settings).await?);
                }
                agent
                    .observe(resolved)
                    .await
                    .map_err(|e| RpcError::Internal(e.to_string()))?;
                Ok(CallAgentFuncResponse::default())
            }
        }
    }

    /// Allocate a task id and register its pending result together,
    /// so the result pool sees ids in increasing order
    fn next_task_id(&self) -> u64 {
        let mut counter = self.task_counter.lock();
        *counter += 1;
        self.results.insert_pending(*counter);
        *counter
    }

    /// Hand the reply to the worker pool; returns the task reference message
    fn submit_reply(&self, agent: Arc<dyn Agent>, message: Option<Message>) -> Message {
        let task_id = self.next_task_id();
        let name = agent.base().name().to_string();
        debug!(task_id, agent_id = %agent.base().id(), "Submitting reply task");

        let results = self.results.clone();
        let workers = self.workers.clone();
        let metrics = self.metrics.clone();
        let client_settings = self.client_settings.clone();
        metrics.tasks_submitted.inc();
        metrics.tasks_in_flight.inc();

        let worker_name = name.clone();
        tokio::spawn(async move {
            let _permit = workers.acquire_owned().await;
            let started = Instant::now();

            let task = tokio::spawn(async move {
                let message = match message {
                    Some(message) => Some(resolve_wire_message(message, &client_settings).await?),
                    None => None,
                };
                Ok::<_, anyhow::Error>(agent.call(message).await?)
            });

            let (result, outcome) = match task.await {
                Ok(Ok(reply)) => (reply, "ok"),
                Ok(Err(e)) => {
                    warn!(task_id, error = %e, "Reply task failed");
                    (Message::error(&worker_name, e.to_string()), "error")
                }
                Err(e) => {
                    error!(task_id, error = %e, "Reply task aborted");
                    (Message::error(&worker_name, format!("reply task aborted: {}", e)), "error")
                }
            };

            metrics.reply_duration.observe(started.elapsed().as_secs_f64());
            metrics.tasks_finished.with_label_values(&[outcome]).inc();
            metrics.tasks_in_flight.dec();
            results.complete(task_id, result);
        });

        let reference = PlaceholderRef {
            host: self.host.clone(),
            port: self.port(),
            task_id,
        };
        Message::new(name, Role::Assistant, Vec::new()).with_metadata(
            PLACEHOLDER_METADATA_KEY,
            serde_json::to_value(reference).unwrap_or_default(),
        )
    }

    /// Wait a bounded slice for a result; `ready` is false if it is still running
    pub async fn get_result(&self, task_id: u64) -> RpcResult<GetResultResponse> {
        let result = self.results.wait(task_id, self.result_wait).await?;
        Ok(GetResultResponse {
            ready: result.is_some(),
            message: result.map(MessageEnvelope::new),
        })
    }

    /// Hosted agents, sorted by id
    pub fn agent_list(&self) -> AgentListResponse {
        let mut agents: Vec<_> = self
            .agents
            .lock()
            .values()
            .map(|hosted| hosted.agent.info())
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        AgentListResponse { agents }
    }

    pub async fn agent_memory(&self, agent_id: &str) -> RpcResult<AgentMemoryResponse> {
        let agent = self.agent(agent_id)?;
        let messages = agent
            .base()
            .memory()
            .get_memory()
            .await
            .map_err(|e| RpcError::Internal(e.to_string()))?;
        Ok(AgentMemoryResponse {
            messages: messages.into_iter().map(MessageEnvelope::new).collect(),
        })
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            server_id: self.server_id.clone(),
            pid: std::process::id(),
            host: self.host.clone(),
            port: self.port(),
            capacity: self.capacity,
            uptime_seconds: self.started.elapsed().as_secs(),
            agents: self.agents.lock().len(),
            pending_tasks: self.results.pending(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::core::{AgentBase, EchoAgent};
    use crate::agents::error::{AgentError, AgentResult};
    use async_trait::async_trait;
    use serde_json::json;

    struct Failing {
        base: AgentBase,
    }

    #[async_trait]
    impl Agent for Failing {
        fn base(&self) -> &AgentBase {
            &self.base
        }

        fn type_name(&self) -> &'static str {
            "FailingAgent"
        }

        async fn reply_impl(&self, _: Option<Message>, _: Option<Value>) -> AgentResult<Message> {
            Err(AgentError::Execution("model unavailable".into()))
        }
    }

    fn servicer() -> AgentServicer {
        let mut factory = AgentFactory::new();
        factory.register_agent(
            "EchoAgent",
            Arc::new(|_, id, _| {
                let agent = EchoAgent::with_base(AgentBase::new("echo").with_id(id));
                agent.base().disable_console_output();
                Ok(Arc::new(agent) as Arc<dyn Agent>)
            }),
        );
        factory.register_agent(
            "FailingAgent",
            Arc::new(|_, id, _| {
                Ok(Arc::new(Failing {
                    base: AgentBase::new("failing").with_id(id),
                }) as Arc<dyn Agent>)
            }),
        );
        AgentServicer::new(&ServerSettings::default(), ClientSettings::default(), Arc::new(factory))
            .unwrap()
    }

    fn create(servicer: &AgentServicer, id: &str, class: &str) -> StatusResponse {
        servicer.create_agent(CreateAgentRequest {
            agent_id: id.into(),
            agent_class: class.into(),
            args: json!({}),
        })
    }

    fn reply_request(id: &str, text: &str) -> CallAgentFuncRequest {
        CallAgentFuncRequest {
            agent_id: id.into(),
            call: AgentCall::Reply {
                message: Some(MessageEnvelope::new(Message::user(text))),
            },
        }
    }

    async fn wait_result(servicer: &AgentServicer, task_id: u64) -> Message {
        loop {
            let response = servicer.get_result(task_id).await.unwrap();
            if let Some(envelope) = response.message {
                return envelope.into_message().unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let servicer = servicer();
        assert!(create(&servicer, "a1", "EchoAgent").ok);
        let second = create(&servicer, "a1", "EchoAgent");
        assert!(!second.ok);
        assert!(second.message.unwrap().contains("already exists"));
        assert!(!create(&servicer, "a2", "Unknown").ok);
        assert_eq!(servicer.agent_list().agents.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_returns_reference_then_result() {
        let servicer = servicer();
        create(&servicer, "a1", "EchoAgent");

        let response = servicer.call_agent_func(reply_request("a1", "hi")).await.unwrap();
        let reference_msg = response.message.unwrap().into_message().unwrap();
        assert!(reference_msg.content.is_empty());
        let reference = PlaceholderRef::from_message(&reference_msg).unwrap();
        assert_eq!(reference.task_id, 1);

        let result = wait_result(&servicer, reference.task_id).await;
        assert_eq!(result.get_text_content().as_deref(), Some("echo: hi"));

        let second = servicer.call_agent_func(reply_request("a1", "again")).await.unwrap();
        let second = PlaceholderRef::from_message(&second.message.unwrap().message).unwrap();
        assert_eq!(second.task_id, 2);
    }

    #[tokio::test]
    async fn test_worker_failure_becomes_error_message() {
        let servicer = servicer();
        create(&servicer, "f1", "FailingAgent");
        let response = servicer.call_agent_func(reply_request("f1", "hi")).await.unwrap();
        let reference = PlaceholderRef::from_message(&response.message.unwrap().message).unwrap();

        let result = wait_result(&servicer, reference.task_id).await;
        assert!(result.is_error());
        assert!(result.get_text_content().unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_invalid_argument() {
        let servicer = servicer();
        let err = servicer.call_agent_func(reply_request("ghost", "hi")).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidArgument(_)));
        let err = servicer
            .call_agent_func(CallAgentFuncRequest {
                agent_id: "ghost".into(),
                call: AgentCall::Observe { messages: vec![] },
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_observe_clone_and_delete() {
        let servicer = servicer();
        create(&servicer, "a1", "EchoAgent");
        servicer
            .call_agent_func(CallAgentFuncRequest {
                agent_id: "a1".into(),
                call: AgentCall::Observe {
                    messages: vec![MessageEnvelope::new(Message::user("note"))],
                },
            })
            .await
            .unwrap();
        assert_eq!(servicer.agent_memory("a1").await.unwrap().messages.len(), 1);

        let cloned = servicer.clone_agent("a1").new_agent_ids;
        assert_eq!(cloned.len(), 1);
        assert_ne!(cloned[0], "a1");
        assert!(servicer.clone_agent("ghost").new_agent_ids.is_empty());
        // clones start from the constructor arguments, not the memory
        assert!(servicer.agent_memory(&cloned[0]).await.unwrap().messages.is_empty());

        assert!(servicer.delete_agents(&["a1".to_string(), "ghost".to_string()]).ok);
        assert_eq!(servicer.server_info().agents, 1);
        servicer.delete_all_agents();
        assert!(servicer.agent_list().agents.is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels_token() {
        let servicer = servicer();
        let token = servicer.stop_token();
        assert!(!token.is_cancelled());
        assert!(servicer.stop().ok);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_create_without_args_uses_id_as_name() {
        let servicer = AgentServicer::new(
            &ServerSettings::default(),
            ClientSettings::default(),
            Arc::new(AgentFactory::with_builtin_agents()),
        )
        .unwrap();
        let request: CreateAgentRequest =
            serde_json::from_value(json!({"agent_id": "a1", "agent_class": "EchoAgent"})).unwrap();
        assert!(request.args.is_null());

        assert!(servicer.create_agent(request).ok);
        let agents = servicer.agent_list().agents;
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "a1");
    }
}
