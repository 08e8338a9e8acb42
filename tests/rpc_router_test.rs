mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use troupe::rpc::{router, AgentFactory, AgentServicer};

fn test_app(max_message_size: usize) -> (Router, Arc<AgentServicer>) {
    let settings = common::test_settings();
    let servicer = Arc::new(
        AgentServicer::new(
            &settings.server,
            settings.client.clone(),
            Arc::new(AgentFactory::with_builtin_agents()),
        )
        .unwrap(),
    );
    (router(servicer.clone(), max_message_size), servicer)
}

async fn post(app: &Router, method: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(format!("/rpc/{}", method))
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body_json = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
    (status, body_json)
}

#[tokio::test]
async fn test_is_alive() {
    let (app, _) = test_app(1 << 20);
    let (status, body) = post(&app, "is_alive", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn test_create_list_and_delete_agents() {
    let (app, _) = test_app(1 << 20);
    let create = json!({"agent_id": "a1", "agent_class": "EchoAgent", "args": {"name": "echo"}});

    let (status, body) = post(&app, "create_agent", create.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));

    let (_, body) = post(&app, "create_agent", create).await;
    assert_eq!(body["ok"], json!(false));
    assert!(body["message"].as_str().unwrap().contains("already exists"));

    let (_, body) = post(&app, "get_agent_list", json!({})).await;
    assert_eq!(body["agents"], json!([{"id": "a1", "name": "echo", "type": "EchoAgent"}]));

    let (_, body) = post(&app, "delete_agents", json!({"agent_ids": ["a1"]})).await;
    assert_eq!(body["ok"], json!(true));
    let (_, body) = post(&app, "get_agent_list", json!({})).await;
    assert_eq!(body["agents"], json!([]));
}

#[tokio::test]
async fn test_unknown_class_is_rejected() {
    let (app, _) = test_app(1 << 20);
    let (status, body) = post(
        &app,
        "create_agent",
        json!({"agent_id": "a1", "agent_class": "NoSuchAgent"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn test_reply_to_unknown_agent_is_invalid_argument() {
    let (app, _) = test_app(1 << 20);
    let (status, body) = post(
        &app,
        "call_agent_func",
        json!({"agent_id": "ghost", "func": "reply"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("invalid_argument"));
    assert!(body["message"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_reply_returns_reference_then_result() {
    let (app, _) = test_app(1 << 20);
    post(
        &app,
        "create_agent",
        json!({"agent_id": "a1", "agent_class": "EchoAgent"}),
    )
    .await;

    let message = json!({
        "version": 1,
        "message": serde_json::to_value(troupe::Message::user("ping")).unwrap()
    });
    let (status, body) = post(
        &app,
        "call_agent_func",
        json!({"agent_id": "a1", "func": "reply", "message": message}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reference = &body["message"]["message"];
    assert_eq!(reference["content"], json!([]));
    let task_id = reference["metadata"]["placeholder"]["task_id"].as_u64().unwrap();

    // The server waits a bounded slice per request; poll until ready
    let mut result = Value::Null;
    for _ in 0..20 {
        let (status, body) = post(&app, "get_result", json!({"task_id": task_id})).await;
        assert_eq!(status, StatusCode::OK);
        if body["ready"] == json!(true) {
            result = body["message"]["message"].clone();
            break;
        }
    }
    assert_eq!(result["content"], json!([{"type": "text", "text": "echo: ping"}]));
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (app, _) = test_app(1 << 20);
    let (status, body) = post(&app, "get_result", json!({"task_id": 999})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], json!("not_found"));
}

#[tokio::test]
async fn test_oversized_request_is_refused() {
    let (app, _) = test_app(256);
    let text = "x".repeat(1024);
    let (status, _) = post(
        &app,
        "call_agent_func",
        json!({"agent_id": "a1", "func": "observe", "messages": [{"version": 1, "message": troupe::Message::user(text)}]}),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_stop_cancels_token() {
    let (app, servicer) = test_app(1 << 20);
    let token = servicer.stop_token();
    assert!(!token.is_cancelled());
    let (status, _) = post(&app, "stop", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = test_app(1 << 20);
    post(&app, "is_alive", json!({})).await;

    let request = Request::builder()
        .uri("/metrics")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("troupe_rpc_calls_total"));
    assert!(text.contains("is_alive"));
}
