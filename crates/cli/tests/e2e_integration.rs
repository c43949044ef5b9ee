//! End-to-end tests for the LakeClaw runtime.
//!
//! These run the full pipeline: engine request, tool declarations, context
//! resolution against the session, action execution against a recorded
//! workspace, and the reply, both in-process and over HTTP.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use lakeclaw_actions::MockWorkspaceApi;
use lakeclaw_agent::scripted::{call, text_response, tool_call_response};
use lakeclaw_agent::{ScriptedProvider, TerminationReason};
use lakeclaw_config::AppConfig;
use lakeclaw_core::error::ActionError;
use lakeclaw_core::event::DomainEvent;
use lakeclaw_core::message::Role;
use lakeclaw_core::provider::Provider;
use lakeclaw_core::session::SessionStore;
use lakeclaw_gateway::Runtime;
use serde_json::{Value, json};
use tower::ServiceExt;

// ── Helpers ──────────────────────────────────────────────────────────────

fn runtime(api: Arc<MockWorkspaceApi>, engine: Option<Arc<ScriptedProvider>>) -> Runtime {
    let provider = engine.map(|p| p as Arc<dyn Provider>);
    Runtime::assemble(AppConfig::default(), api, provider).unwrap()
}

async fn post(rt: Arc<Runtime>, uri: &str, session: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-session-id", session)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = lakeclaw_gateway::build_router(rt).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ── In-process conversations ─────────────────────────────────────────────

#[tokio::test]
async fn chat_sets_cluster_then_starts_it() {
    let api = Arc::new(MockWorkspaceApi::new());
    let engine = Arc::new(ScriptedProvider::new(vec![
        tool_call_response(vec![call("c1", "set_current_cluster", json!({"cluster_id": "c-42"}))]),
        tool_call_response(vec![call("c2", "start_cluster", json!({}))]),
        text_response("Cluster c-42 is starting."),
    ]));
    let rt = runtime(api.clone(), Some(engine.clone()));
    let orchestrator = rt.orchestrator.clone().unwrap();

    let outcome = orchestrator.chat("S1", "Start cluster c-42 and remember it").await;

    assert_eq!(outcome.reason, TerminationReason::FinalAnswer);
    assert_eq!(outcome.reply(), "Cluster c-42 is starting.");
    assert_eq!(outcome.steps(), 3);

    let starts: Vec<_> = api
        .calls()
        .into_iter()
        .filter(|c| c.path == "/api/2.0/clusters/start")
        .collect();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].body, Some(json!({"cluster_id": "c-42"})));

    let record = rt.sessions.snapshot("S1").await;
    assert_eq!(record.current_cluster_id.as_deref(), Some("c-42"));

    // Every request advertised the full catalog
    for request in engine.requests() {
        assert_eq!(request.tools.len(), 36);
    }
}

#[tokio::test]
async fn remote_failure_reaches_engine_and_user() {
    let api = Arc::new(MockWorkspaceApi::new());
    api.fail(
        "/api/2.0/clusters/delete",
        ActionError::rejected("User lacks CAN_RESTART on cluster"),
    );
    let engine = Arc::new(ScriptedProvider::new(vec![
        tool_call_response(vec![call("c1", "stop_cluster", json!({"cluster_id": "c-1"}))]),
        text_response(""),
    ]));
    let rt = runtime(api.clone(), Some(engine.clone()));

    let outcome = rt.orchestrator.clone().unwrap().chat("S1", "stop c-1").await;

    let second = &engine.requests()[1];
    assert!(second
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.content.contains("User lacks CAN_RESTART on cluster")));

    let reply = outcome.reply();
    assert!(reply.contains("stop_cluster (remote-rejected)"));
    assert!(reply.contains("User lacks CAN_RESTART on cluster"));

    // Mutating actions are not retried
    assert_eq!(api.call_count("/api/2.0/clusters/delete"), 1);
}

#[tokio::test]
async fn sessions_do_not_leak_between_conversations() {
    let api = Arc::new(MockWorkspaceApi::new());
    let rt = runtime(api.clone(), None);

    let set = rt
        .executor
        .execute("A", "set_current_warehouse", json!({"warehouse_id": "wh-a"}))
        .await;
    assert!(set.is_ok());

    let other = rt
        .executor
        .execute("B", "execute_query", json!({"query": "SELECT 1"}))
        .await;
    let err = other.error().unwrap();
    assert_eq!(err.param.as_deref(), Some("warehouse_id"));
    assert!(api.calls().is_empty());

    let same = rt
        .executor
        .execute("A", "execute_query", json!({"query": "SELECT 1"}))
        .await;
    assert!(same.is_ok());
    assert_eq!(api.calls()[0].body.as_ref().unwrap()["warehouse_id"], "wh-a");
}

#[tokio::test]
async fn actions_publish_events() {
    let api = Arc::new(MockWorkspaceApi::new());
    let rt = runtime(api, None);
    let mut rx = rt.events.subscribe();

    rt.executor.execute("S1", "list_clusters", json!({})).await;

    let event = rx.recv().await.unwrap();
    match event.as_ref() {
        DomainEvent::ActionExecuted {
            session_id,
            action,
            error_kind,
            attempts,
            ..
        } => {
            assert_eq!(session_id, "S1");
            assert_eq!(action, "list_clusters");
            assert!(error_kind.is_none());
            assert_eq!(*attempts, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ── Over HTTP ────────────────────────────────────────────────────────────

#[tokio::test]
async fn http_session_defaults_follow_header() {
    let api = Arc::new(MockWorkspaceApi::new());
    let rt = Arc::new(runtime(api.clone(), None));

    let (status, _) = post(
        rt.clone(),
        "/v1/actions/set_current_cluster",
        "S1",
        json!({"arguments": {"cluster_id": "c-7"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post(rt.clone(), "/v1/actions/get_cluster", "S1", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["arguments"]["cluster_id"], "c-7");
    assert_eq!(json["provenance"]["cluster_id"], "session");

    let (status, json) = post(rt, "/v1/actions/get_cluster", "S2", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["kind"], "validation");
    assert_eq!(api.call_count("/api/2.0/clusters/get"), 1);
}

#[tokio::test]
async fn http_chat_round_trip() {
    let api = Arc::new(MockWorkspaceApi::new());
    api.respond(
        "/api/2.0/clusters/list",
        json!({"clusters": [{"cluster_id": "c-1", "cluster_name": "etl", "state": "RUNNING"}]}),
    );
    let engine = Arc::new(ScriptedProvider::tool_then_answer(
        vec![call("c1", "list_clusters", json!({}))],
        "You have one running cluster: etl.",
    ));
    let rt = Arc::new(runtime(api, Some(engine)));

    let (status, json) = post(rt, "/v1/chat", "S1", json!({"message": "What clusters do I have?"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reply"], "You have one running cluster: etl.");
    assert_eq!(json["reason"], "final-answer");
    assert_eq!(json["state"]["step"], 2);
}
