//! HTTP API tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use gateway::{register_platform_tools, Gateway, PlatformBackend, PlatformSettings};
use orchestrator::{router, Orchestrator, WorkflowSettings};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app() -> Router {
    let gateway = Arc::new(Gateway::new());
    register_platform_tools(&gateway, Arc::new(PlatformBackend::new(PlatformSettings::default())))
        .await
        .unwrap();
    let settings = WorkflowSettings {
        stabilization_delay: Duration::ZERO,
        ..WorkflowSettings::default()
    };
    let orchestrator = Orchestrator::new(gateway, settings).unwrap();
    router(orchestrator, Duration::from_secs(5))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_submit_returns_pending_request() {
    let app = app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/requests",
            r#"{"request": "Please deploy this model", "params": {"customer_id": "acme", "model_id": "m1"}}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["intent"], "deploy_model");
    assert_eq!(body["raw_request"], "Please deploy this model");
    assert_eq!(body["parameters"]["customer_id"], "acme");

    let id = body["id"].as_str().unwrap();
    let (status, fetched) = send(&app, get(&format!("/api/v1/requests/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id);
}

#[tokio::test]
async fn test_submit_without_params_defaults_to_empty_object() {
    let app = app().await;
    let (status, body) = send(&app, post_json("/api/v1/requests", r#"{"request": "asdfasdf"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent"], "unknown");
    assert_eq!(body["parameters"], json!({}));
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = app().await;

    let (status, body) = send(&app, post_json("/api/v1/requests", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, post_json("/api/v1/requests", r#"{"params": {}}"#)).await;
    assert!(status.is_client_error());
    assert!(body["error"].as_str().unwrap().contains("request"));
}

#[tokio::test]
async fn test_unknown_request_is_404() {
    let app = app().await;
    let (status, body) = send(&app, get("/api/v1/requests/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "request not found: does-not-exist");
}

#[tokio::test]
async fn test_workflow_listing() {
    let app = app().await;
    for text in ["deploy a", "deploy b"] {
        let (status, _) = send(
            &app,
            post_json(
                "/api/v1/requests",
                &json!({ "request": text, "params": { "customer_id": "acme", "model_id": "m" } })
                    .to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, get("/api/v1/workflows")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["workflows"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_workflow_definitions() {
    let app = app().await;
    let (status, body) = send(&app, get("/api/v1/workflow-definitions")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    let deploy = body["definitions"]
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["name"] == "deploy_model")
        .unwrap();
    assert_eq!(
        deploy["steps"],
        json!(["validate_customer", "allocate_gpu", "deploy_model", "validate_deployment"])
    );
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "orchestrator");
}
