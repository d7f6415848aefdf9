//! Tests for the HTTP `GatewayClient` against a live in-process gateway and
//! against mocked upstreams.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gateway::{
    register_platform_tools, router, wait_for_training, Gateway, GatewayClient, InvokeError,
    PlatformBackend, PlatformSettings, ToolInvoker, TrainingPoll,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Start a gateway with the platform toolset on a random port.
async fn start_gateway() -> SocketAddr {
    let gateway = Arc::new(Gateway::new());
    let backend = Arc::new(PlatformBackend::new(PlatformSettings {
        training_duration: Duration::from_millis(100),
        ..PlatformSettings::default()
    }));
    register_platform_tools(&gateway, backend).await.unwrap();
    let app = router(gateway, Duration::from_secs(10));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_client_round_trip() {
    let addr = start_gateway().await;
    let client = GatewayClient::new(&format!("http://{addr}")).unwrap();

    let result = client
        .invoke("allocate_gpu", json!({ "vgpu_size": 1.0 }))
        .await
        .unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["pool_name"], "default-pool");
}

#[tokio::test]
async fn test_client_surfaces_not_found_detail() {
    let addr = start_gateway().await;
    let client = GatewayClient::new(&format!("http://{addr}/")).unwrap();

    let err = client
        .invoke("vllm.nonexistent_tool", json!({}))
        .await
        .unwrap_err();
    match err {
        InvokeError::Rpc { code, message } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "tool not found: nonexistent_tool");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_training_poll_over_http() {
    let addr = start_gateway().await;
    let client = GatewayClient::new(&format!("http://{addr}")).unwrap();

    let started = client
        .invoke("start_training", json!({ "dataset_path": "s3://d/train.jsonl" }))
        .await
        .unwrap();
    let job_id = started["job_id"].as_str().unwrap();

    let poll = TrainingPoll {
        interval: Duration::from_millis(25),
        timeout: Duration::from_secs(5),
    };
    let status = wait_for_training(&client, job_id, &poll, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status["status"], "completed");
    assert_eq!(status["adapter_id"], format!("adapter-{job_id}"));
}

#[tokio::test]
async fn test_non_envelope_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = GatewayClient::new(&server.uri()).unwrap();
    let err = client.invoke("get_costs", json!({})).await.unwrap_err();
    match err {
        InvokeError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_null_result_is_ok() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1
        })))
        .mount(&server)
        .await;

    let client = GatewayClient::new(&server.uri()).unwrap();
    let result = client.invoke("anything", json!({})).await.unwrap();
    assert!(result.is_null());
}

#[tokio::test]
async fn test_garbage_success_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = GatewayClient::new(&server.uri()).unwrap();
    let err = client.invoke("anything", json!({})).await.unwrap_err();
    assert!(matches!(err, InvokeError::Decode(_)));
}
