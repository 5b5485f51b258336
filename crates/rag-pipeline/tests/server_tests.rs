//! HTTP routes end to end against stub collaborators

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{eventually, Fault, Stubs};
use rag_pipeline::server::PipelineServer;
use rag_pipeline::{JobStatus, JobStore};

fn router(stubs: &Stubs) -> Router {
    PipelineServer::with_state(stubs.app_state()).build_router()
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_reports_missing_settings() {
    let stubs = Stubs::new();
    let (status, body) = send(&router(&stubs), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(!body["problems"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_reports_unreachable_cache() {
    let stubs = Stubs::new();
    let router = router(&stubs);

    let (_, healthy) = send(&router, "GET", "/health", None).await;
    let cache_problem = |body: &Value| {
        body["problems"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p.as_str().unwrap_or("").starts_with("stub-cache cache error"))
    };
    assert!(!cache_problem(&healthy));

    *stubs.cache.fault.lock() = Some(Fault::Transient);
    let (status, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(cache_problem(&body));
}

#[tokio::test]
async fn test_submitted_text_job_completes() {
    let stubs = Stubs::new();
    let router = router(&stubs);

    let (status, body) = send(
        &router,
        "POST",
        "/ingest",
        Some(json!({"text": "hello world", "filename": "a.txt"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let store = stubs.job_store.clone();
    assert!(
        eventually(|| {
            store
                .get(&job_id)
                .map(|r| r.status == JobStatus::Done)
                .unwrap_or(false)
        })
        .await
    );

    let (status, body) = send(&router, "GET", &format!("/jobs/{}", job_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");
    assert_eq!(body["details"]["result"]["stored"], 1);
    assert!(body["details"]["errors"].as_array().unwrap().is_empty());

    let (_, list) = send(&router, "GET", "/jobs", None).await;
    assert_eq!(list["stats"]["done"], 1);
    assert_eq!(list["jobs"][0]["job_id"], job_id.as_str());
}

#[tokio::test]
async fn test_failed_job_records_stage_errors() {
    let stubs = Stubs::new();
    *stubs.embedder.fault.lock() = Some(Fault::Rejected);
    let router = router(&stubs);

    let (_, body) = send(
        &router,
        "POST",
        "/ingest",
        Some(json!({"job_id": "job-1", "text": "hello"})),
    )
    .await;
    assert_eq!(body["job_id"], "job-1");

    let store = stubs.job_store.clone();
    assert!(
        eventually(|| {
            store
                .get("job-1")
                .map(|r| r.status == JobStatus::Failed)
                .unwrap_or(false)
        })
        .await
    );

    let (_, body) = send(&router, "GET", "/jobs/job-1", None).await;
    assert_eq!(body["details"]["errors"][0]["stage"], "embed");
    assert_eq!(body["details"]["errors"][0]["position"], 3);
    assert!(body["details"]["result"].is_null());
}

#[tokio::test]
async fn test_job_submission_errors() {
    let stubs = Stubs::new();
    let router = router(&stubs);

    let (status, _) = send(&router, "POST", "/ingest", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        "POST",
        "/ingest",
        Some(json!({"job_id": "dup", "text": "one"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, body) = send(
        &router,
        "POST",
        "/ingest",
        Some(json!({"job_id": "dup", "text": "two"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_input");

    let (status, body) = send(&router, "GET", "/jobs/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_push_ingests_synchronously() {
    let stubs = Stubs::new();
    let router = router(&stubs);
    let data = STANDARD.encode(json!({"bucket": "docs", "name": "q1.pdf"}).to_string());

    let (status, body) = send(
        &router,
        "POST",
        "/",
        Some(json!({"message": {"data": data, "messageId": "1"}, "subscription": "s"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["acknowledged"], true);
    assert_eq!(body["stored"], 1);
}

#[tokio::test]
async fn test_push_rejects_undecodable_payload() {
    let stubs = Stubs::new();
    let router = router(&stubs);

    let (status, body) = send(&router, "POST", "/", Some(json!({"message": {}}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["stage"], "decode");
    assert_eq!(stubs.chunker.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_push_rejects_malformed_envelope() {
    let stubs = Stubs::new();
    let router = router(&stubs);

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["stage"], "decode");

    let (status, body) = send(&router, "POST", "/", Some(json!({"subscription": "s"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["stage"], "decode");
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert_eq!(stubs.chunker.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_push_reports_remote_failure() {
    let stubs = Stubs::new();
    *stubs.index.store_fault.lock() = Some(Fault::Transient);
    let router = router(&stubs);
    let data = STANDARD.encode(json!({"text": "hello"}).to_string());

    let (status, body) = send(&router, "POST", "/", Some(json!({"message": {"data": data}}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["stage"], "store");
    assert_eq!(body["errors"][0]["attempts"], 3);
}

#[tokio::test]
async fn test_ask_route() {
    let stubs = Stubs::new();
    *stubs.index.neighbors.lock() = vec!["RAG retrieves context".into()];
    let router = router(&stubs);

    let (status, body) = send(&router, "POST", "/ask", Some(json!({"question": "What is RAG?"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], false);
    assert_eq!(body["contexts_count"], 1);

    // Second ask is served from the in-process cache
    let (_, body) = send(&router, "POST", "/ask", Some(json!({"question": "what is rag?"}))).await;
    assert_eq!(body["found"], true);

    let (status, body) = send(&router, "POST", "/ask", Some(json!({"question": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["stage"], "decode");
}

#[tokio::test]
async fn test_ask_generate_failure_is_unavailable() {
    let stubs = Stubs::new();
    *stubs.generator.fault.lock() = Some(Fault::Transient);
    let router = router(&stubs);

    let (status, body) = send(&router, "POST", "/ask", Some(json!({"question": "why?"}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["stage"], "generate");
}

#[tokio::test]
async fn test_subscription_admin_routes() {
    let stubs = Stubs::new();
    let router = router(&stubs);

    let (status, body) = send(&router, "GET", "/subscription", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");

    let (status, body) = send(&router, "POST", "/subscription/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "running");
    assert_eq!(body["stats"]["tasks_spawned"], 1);

    let (_, body) = send(&router, "POST", "/subscription/start", None).await;
    assert_eq!(body["stats"]["tasks_spawned"], 1);

    let (status, body) = send(&router, "POST", "/subscription/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
}

#[tokio::test]
async fn test_subscription_connect_failure_is_unavailable() {
    let stubs = Stubs::new();
    *stubs.broker.connect_fault.lock() = Some(Fault::Transient);
    let router = router(&stubs);

    let (status, _) = send(&router, "POST", "/subscription/start", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, health) = send(&router, "GET", "/health", None).await;
    let problems = health["problems"].as_array().unwrap();
    assert!(problems
        .iter()
        .any(|p| p.as_str().unwrap_or("").contains("connect failed")));
}
