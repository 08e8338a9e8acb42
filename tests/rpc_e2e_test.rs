mod common;

use serde_json::json;
use std::sync::Arc;
use troupe::agents::{Agent, AgentExt, Message};
use troupe::rpc::{bind_listener, AgentFactory, LaunchMode, LaunchedServer, RpcAgent, ServerLauncher};

async fn launch() -> LaunchedServer {
    ServerLauncher::in_process(
        common::test_settings(),
        Arc::new(AgentFactory::with_builtin_agents()),
    )
    .launch()
    .await
    .unwrap()
}

#[tokio::test]
async fn test_remote_echo_reply() {
    let server = launch().await;
    assert_eq!(server.mode(), LaunchMode::InProcess);
    let client = server.client().unwrap();
    assert!(client.is_alive().await);

    let agent = RpcAgent::create(client.clone(), "EchoAgent", json!({"name": "echo"}))
        .await
        .unwrap();
    agent.base().disable_console_output();

    let reply = agent.call(Some(Message::user("hello"))).await.unwrap();
    assert_eq!(reply.get_text_content().as_deref(), Some("echo: hello"));
    assert_eq!(reply.name, "echo");

    let memory = client.get_agent_memory(agent.base().id()).await.unwrap();
    assert_eq!(memory.len(), 2);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_placeholder_resolves_once() {
    let server = launch().await;
    let agent = RpcAgent::create(server.client().unwrap(), "EchoAgent", json!({}))
        .await
        .unwrap();

    let placeholder = agent.reply_placeholder(Some(Message::user("hi"))).await.unwrap();
    assert!(!placeholder.is_resolved());
    let first = placeholder.resolve().await.unwrap().clone();
    assert!(placeholder.is_resolved());
    let second = placeholder.resolve().await.unwrap();
    assert_eq!(&first, second);
    assert_eq!(first.get_text_content().as_deref(), Some("echo: hi"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_observe_resolves_forwarded_placeholder() {
    let server = launch().await;
    let client = server.client().unwrap();
    let speaker = RpcAgent::create(client.clone(), "EchoAgent", json!({"name": "speaker"}))
        .await
        .unwrap();
    let listener = RpcAgent::create(client.clone(), "EchoAgent", json!({"name": "listener"}))
        .await
        .unwrap();

    // The listener receives the unresolved reference and fetches the result itself
    let placeholder = speaker.reply_placeholder(Some(Message::user("news"))).await.unwrap();
    client
        .observe(listener.base().id(), vec![placeholder.to_wire()])
        .await
        .unwrap();

    let memory = client.get_agent_memory(listener.base().id()).await.unwrap();
    assert_eq!(memory.len(), 1);
    assert_eq!(memory[0].get_text_content().as_deref(), Some("echo: news"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_clone_and_close() {
    let server = launch().await;
    let client = server.client().unwrap();
    let agent = RpcAgent::create(client.clone(), "EchoAgent", json!({"name": "echo"}))
        .await
        .unwrap();

    let clones = agent.clone_instances(2).await.unwrap();
    assert_eq!(clones.len(), 2);
    assert_ne!(clones[0].base().id(), agent.base().id());
    assert_eq!(client.get_agent_list().await.unwrap().len(), 3);

    // Clones keep their own memory
    clones[0].base().disable_console_output();
    clones[0].call(Some(Message::user("one"))).await.unwrap();
    assert_eq!(client.get_agent_memory(clones[0].base().id()).await.unwrap().len(), 2);
    assert!(client.get_agent_memory(agent.base().id()).await.unwrap().is_empty());

    agent.close().await.unwrap();
    let remaining = client.get_agent_list().await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|info| info.id != agent.base().id()));

    let info = client.get_server_info().await.unwrap();
    assert_eq!(info.agents, 2);
    assert_eq!(info.port, server.port());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let server = launch().await;
    let client = server.client().unwrap();
    assert!(client.is_alive().await);

    server.shutdown().await.unwrap();
    server.shutdown().await.unwrap();
    assert!(!client.is_alive().await);
}

#[tokio::test]
async fn test_configured_agents_are_deployed() {
    let mut settings = common::test_settings();
    settings.agents = vec![troupe::config::AgentDeployment {
        id: "greeter".into(),
        class: "EchoAgent".into(),
        args: json!({"name": "greeter"}),
    }];
    let server = ServerLauncher::in_process(settings, Arc::new(AgentFactory::with_builtin_agents()))
        .launch()
        .await
        .unwrap();

    let agents = server.client().unwrap().get_agent_list().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].id, "greeter");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_taken_port_falls_back_to_free_port() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut settings = common::test_settings();
    settings.server.port = Some(port);
    let listener = bind_listener(&settings.server).await.unwrap();
    let bound = listener.local_addr().unwrap().port();
    assert_ne!(bound, port);
    assert_ne!(bound, 0);
}

#[tokio::test]
async fn test_subprocess_server() {
    let server = ServerLauncher::subprocess(common::test_settings())
        .with_program(env!("CARGO_BIN_EXE_troupe"))
        .launch()
        .await
        .unwrap();
    assert_eq!(server.mode(), LaunchMode::Subprocess);

    let client = server.client().unwrap();
    assert!(client.is_alive().await);
    let info = client.get_server_info().await.unwrap();
    assert_ne!(info.pid, std::process::id());

    let agent = RpcAgent::create(client.clone(), "EchoAgent", json!({})).await.unwrap();
    agent.base().disable_console_output();
    let reply = agent.call(Some(Message::user("far away"))).await.unwrap();
    assert_eq!(reply.get_text_content().as_deref(), Some("echo: far away"));

    server.shutdown().await.unwrap();
    assert!(!client.is_alive().await);
}
