//! HTTP transport of the servicer

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::factory::AgentFactory;
use super::protocol::{
    method_path, methods, AgentIdRequest, AgentListResponse, AgentMemoryResponse,
    CallAgentFuncRequest, CallAgentFuncResponse, CloneAgentResponse, CreateAgentRequest,
    DeleteAgentsRequest, Empty, ErrorBody, GetResultRequest, GetResultResponse, ServerInfo,
    StatusResponse,
};
use super::servicer::AgentServicer;
use super::{RpcError, RpcResult};
use crate::config::{ServerSettings, Settings};

type Shared = State<Arc<AgentServicer>>;

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = match status {
            super::protocol::ErrorStatus::InvalidArgument => StatusCode::BAD_REQUEST,
            super::protocol::ErrorStatus::NotFound => StatusCode::NOT_FOUND,
            super::protocol::ErrorStatus::ResourceExhausted => StatusCode::PAYLOAD_TOO_LARGE,
            super::protocol::ErrorStatus::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match self {
            RpcError::InvalidArgument(m)
            | RpcError::NotFound(m)
            | RpcError::ResourceExhausted(m)
            | RpcError::Internal(m) => m,
            other => other.to_string(),
        };
        (code, Json(ErrorBody { status, message })).into_response()
    }
}

fn respond<T: Serialize>(
    servicer: &AgentServicer,
    method: &str,
    result: RpcResult<T>,
) -> Result<Json<T>, RpcError> {
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.status().as_str(),
    };
    servicer.metrics().record_call(method, status);
    result.map(Json)
}

async fn is_alive(State(servicer): Shared, Json(_): Json<Empty>) -> Result<Json<StatusResponse>, RpcError> {
    respond(&servicer, methods::IS_ALIVE, Ok(servicer.is_alive()))
}

async fn stop(State(servicer): Shared, Json(_): Json<Empty>) -> Result<Json<StatusResponse>, RpcError> {
    respond(&servicer, methods::STOP, Ok(servicer.stop()))
}

async fn create_agent(
    State(servicer): Shared,
    Json(request): Json<CreateAgentRequest>,
) -> Result<Json<StatusResponse>, RpcError> {
    let response = servicer.create_agent(request);
    respond(&servicer, methods::CREATE_AGENT, Ok(response))
}

async fn delete_agents(
    State(servicer): Shared,
    Json(request): Json<DeleteAgentsRequest>,
) -> Result<Json<StatusResponse>, RpcError> {
    let response = servicer.delete_agents(&request.agent_ids);
    respond(&servicer, methods::DELETE_AGENTS, Ok(response))
}

async fn delete_all_agents(
    State(servicer): Shared,
    Json(_): Json<Empty>,
) -> Result<Json<StatusResponse>, RpcError> {
    respond(&servicer, methods::DELETE_ALL_AGENTS, Ok(servicer.delete_all_agents()))
}

async fn clone_agent(
    State(servicer): Shared,
    Json(request): Json<AgentIdRequest>,
) -> Result<Json<CloneAgentResponse>, RpcError> {
    let response = servicer.clone_agent(&request.agent_id);
    respond(&servicer, methods::CLONE_AGENT, Ok(response))
}

async fn call_agent_func(
    State(servicer): Shared,
    Json(request): Json<CallAgentFuncRequest>,
) -> Result<Json<CallAgentFuncResponse>, RpcError> {
    let result = servicer.call_agent_func(request).await;
    respond(&servicer, methods::CALL_AGENT_FUNC, result)
}

async fn get_result(
    State(servicer): Shared,
    Json(request): Json<GetResultRequest>,
) -> Result<Json<GetResultResponse>, RpcError> {
    let result = servicer.get_result(request.task_id).await;
    respond(&servicer, methods::GET_RESULT, result)
}

async fn get_agent_list(
    State(servicer): Shared,
    Json(_): Json<Empty>,
) -> Result<Json<AgentListResponse>, RpcError> {
    respond(&servicer, methods::GET_AGENT_LIST, Ok(servicer.agent_list()))
}

async fn get_server_info(
    State(servicer): Shared,
    Json(_): Json<Empty>,
) -> Result<Json<ServerInfo>, RpcError> {
    respond(&servicer, methods::GET_SERVER_INFO, Ok(servicer.server_info()))
}

async fn get_agent_memory(
    State(servicer): Shared,
    Json(request): Json<AgentIdRequest>,
) -> Result<Json<AgentMemoryResponse>, RpcError> {
    let result = servicer.agent_memory(&request.agent_id).await;
    respond(&servicer, methods::GET_AGENT_MEMORY, result)
}

async fn metrics(State(servicer): Shared) -> String {
    servicer.metrics().encode().unwrap_or_else(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        String::from("# Error encoding metrics\n")
    })
}

/// Router serving every method at `/rpc/<method>` plus `GET /metrics`
pub fn router(servicer: Arc<AgentServicer>, max_message_size: usize) -> Router {
    Router::new()
        .route(&method_path(methods::IS_ALIVE), post(is_alive))
        .route(&method_path(methods::STOP), post(stop))
        .route(&method_path(methods::CREATE_AGENT), post(create_agent))
        .route(&method_path(methods::DELETE_AGENTS), post(delete_agents))
        .route(&method_path(methods::DELETE_ALL_AGENTS), post(delete_all_agents))
        .route(&method_path(methods::CLONE_AGENT), post(clone_agent))
        .route(&method_path(methods::CALL_AGENT_FUNC), post(call_agent_func))
        .route(&method_path(methods::GET_RESULT), post(get_result))
        .route(&method_path(methods::GET_AGENT_LIST), post(get_agent_list))
        .route(&method_path(methods::GET_SERVER_INFO), post(get_server_info))
        .route(&method_path(methods::GET_AGENT_MEMORY), post(get_agent_memory))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(max_message_size))
        .layer(TraceLayer::new_for_http())
        .with_state(servicer)
}

/// Bind the requested port, or any free port when none is requested or it is taken
pub async fn bind_listener(settings: &ServerSettings) -> RpcResult<TcpListener> {
    let host = settings.bind_host();
    if let Some(port) = settings.port {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => warn!(
                port,
                error = %e,
                "Requested port is not available, falling back to a free port"
            ),
        }
    }
    Ok(TcpListener::bind((host, 0)).await?)
}

/// A bound server, ready to run
pub struct RpcServer {
    listener: TcpListener,
    servicer: Arc<AgentServicer>,
    max_message_size: usize,
}

impl RpcServer {
    /// Bind, build the servicer and create the configured agents
    pub async fn bind(settings: &Settings, factory: Arc<AgentFactory>) -> RpcResult<Self> {
        let listener = bind_listener(&settings.server).await?;
        let port = listener.local_addr()?.port();

        let servicer = AgentServicer::new(&settings.server, settings.client.clone(), factory)
            .map_err(|e| RpcError::Server(e.to_string()))?;
        servicer.set_port(port);
        servicer.deploy(&settings.agents)?;

        Ok(Self {
            listener,
            servicer: Arc::new(servicer),
            max_message_size: settings.server.max_message_size,
        })
    }

    /// Port actually bound
    pub fn port(&self) -> u16 {
        self.servicer.port()
    }

    pub fn servicer(&self) -> Arc<AgentServicer> {
        self.servicer.clone()
    }

    /// Serve until a stop is requested
    pub async fn run(self) -> RpcResult<()> {
        let stop = self.servicer.stop_token();
        info!(
            server_id = %self.servicer.server_id(),
            port = self.port(),
            "RPC server listening"
        );
        let app = router(self.servicer, self.max_message_size);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await?;
        info!("RPC server stopped");
        Ok(())
    }
}
