//! `KubeEndpointStore` against a scripted API server.

use std::collections::BTreeMap;

use kube::{Api, Client, Config};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use discovery::{
    EndpointPhase, EndpointStore, KubeEndpointStore, LLMEndpoint, LLMEndpointSpec,
    LLMEndpointStatus, StoreError,
};

const COLLECTION: &str = "/apis/gpufleet.io/v1/llmendpoints";
const RECORD: &str = "/apis/gpufleet.io/v1/llmendpoints/ml-svc1";
const RECORD_STATUS: &str = "/apis/gpufleet.io/v1/llmendpoints/ml-svc1/status";

fn store(server: &MockServer, max_retries: u32) -> KubeEndpointStore {
    let config = Config::new(server.uri().parse().unwrap());
    let client = Client::try_from(config).unwrap();
    KubeEndpointStore::with_api(Api::all(client), max_retries)
}

fn spec(url: &str) -> LLMEndpointSpec {
    LLMEndpointSpec {
        name: "ml-svc1".to_string(),
        url: url.to_string(),
        endpoint_type: "vllm".to_string(),
        provider: "self-hosted".to_string(),
        priority: 50,
        authentication: None,
    }
}

/// The record as the agent would write it.
fn desired(url: &str) -> LLMEndpoint {
    let mut record = LLMEndpoint::new("ml-svc1", spec(url));
    record.metadata.labels = Some(BTreeMap::from([(
        "app.kubernetes.io/managed-by".to_string(),
        "discovery-agent".to_string(),
    )]));
    record
}

/// The record as stored on the server, without the managed-by label.
fn stored(url: &str) -> Value {
    json!({
        "apiVersion": "gpufleet.io/v1",
        "kind": "LLMEndpoint",
        "metadata": {
            "name": "ml-svc1",
            "resourceVersion": "7",
            "labels": { "team": "ml" }
        },
        "spec": serde_json::to_value(spec(url)).unwrap()
    })
}

fn status_error(code: u16, reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("simulated {reason}"),
        "reason": reason,
        "code": code
    }))
}

async fn requests(server: &MockServer, verb: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == verb)
        .map(|request| serde_json::from_slice(&request.body).unwrap_or(Value::Null))
        .collect()
}

async fn existing_record(server: &MockServer, url: &str) {
    Mock::given(method("POST"))
        .and(path(COLLECTION))
        .respond_with(status_error(409, "AlreadyExists"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(RECORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored(url)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_apply_replaces_after_conflicting_create() {
    let server = MockServer::start().await;
    existing_record(&server, "http://old:8000").await;
    Mock::given(method("PUT"))
        .and(path(RECORD))
        .respond_with(status_error(409, "Conflict"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(RECORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("http://svc1:8000")))
        .mount(&server)
        .await;

    store(&server, 3)
        .apply(&desired("http://svc1:8000"))
        .await
        .unwrap();

    let puts = requests(&server, "PUT").await;
    assert_eq!(puts.len(), 2);
    assert_eq!(requests(&server, "GET").await.len(), 2);

    let last = &puts[1];
    assert_eq!(last["spec"]["url"], "http://svc1:8000");
    assert_eq!(last["metadata"]["resourceVersion"], "7");
    assert_eq!(last["metadata"]["labels"]["app.kubernetes.io/managed-by"], "discovery-agent");
    assert_eq!(last["metadata"]["labels"]["team"], "ml");
}

#[tokio::test]
async fn test_apply_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    existing_record(&server, "http://old:8000").await;
    Mock::given(method("PUT"))
        .and(path(RECORD))
        .respond_with(status_error(409, "Conflict"))
        .mount(&server)
        .await;

    let err = store(&server, 3)
        .apply(&desired("http://svc1:8000"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, StoreError::Conflict { ref name, attempts: 3 } if name == "ml-svc1"),
        "{err}"
    );
    assert_eq!(requests(&server, "PUT").await.len(), 3);
}

#[tokio::test]
async fn test_apply_adds_missing_label_to_unchanged_spec() {
    let server = MockServer::start().await;
    existing_record(&server, "http://svc1:8000").await;
    Mock::given(method("PUT"))
        .and(path(RECORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("http://svc1:8000")))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, 3)
        .apply(&desired("http://svc1:8000"))
        .await
        .unwrap();

    let puts = requests(&server, "PUT").await;
    assert_eq!(puts[0]["metadata"]["labels"]["app.kubernetes.io/managed-by"], "discovery-agent");
}

#[tokio::test]
async fn test_apply_skips_write_when_already_current() {
    let server = MockServer::start().await;
    let mut current = stored("http://svc1:8000");
    current["metadata"]["labels"]["app.kubernetes.io/managed-by"] = json!("discovery-agent");
    Mock::given(method("POST"))
        .and(path(COLLECTION))
        .respond_with(status_error(409, "AlreadyExists"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RECORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(current))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    store(&server, 3)
        .apply(&desired("http://svc1:8000"))
        .await
        .unwrap();
}

fn healthy_status() -> LLMEndpointStatus {
    LLMEndpointStatus {
        phase: EndpointPhase::Healthy,
        ..LLMEndpointStatus::default()
    }
}

#[tokio::test]
async fn test_status_patch_retries_on_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RECORD_STATUS))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("http://svc1:8000")))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(RECORD_STATUS))
        .respond_with(status_error(409, "Conflict"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(RECORD_STATUS))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("http://svc1:8000")))
        .mount(&server)
        .await;

    store(&server, 3)
        .update_status("ml-svc1", &healthy_status())
        .await
        .unwrap();

    let patches = requests(&server, "PATCH").await;
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[1]["metadata"]["resourceVersion"], "7");
    assert_eq!(patches[1]["status"]["phase"], "Healthy");
}

#[tokio::test]
async fn test_status_patch_of_missing_record_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RECORD_STATUS))
        .respond_with(status_error(404, "NotFound"))
        .mount(&server)
        .await;

    let err = store(&server, 3)
        .update_status("ml-svc1", &healthy_status())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(ref name) if name == "ml-svc1"));
}
