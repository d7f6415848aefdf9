//! End-to-end workflow execution against an in-process gateway and against
//! scripted invokers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gateway::{
    register_platform_tools, Gateway, InvokeError, PlatformBackend, PlatformSettings, ToolInvoker,
    TrainingPoll,
};
use orchestrator::{Orchestrator, Request, RequestStatus, WorkflowSettings};
use serde_json::{json, Value};

fn fast_settings() -> WorkflowSettings {
    WorkflowSettings {
        stabilization_delay: Duration::ZERO,
        training_poll: TrainingPoll {
            interval: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        },
        ..WorkflowSettings::default()
    }
}

async fn platform_gateway() -> Arc<Gateway> {
    let gateway = Arc::new(Gateway::new());
    let backend = Arc::new(PlatformBackend::new(PlatformSettings {
        training_duration: Duration::from_millis(100),
        ..PlatformSettings::default()
    }));
    register_platform_tools(&gateway, backend).await.unwrap();
    gateway
}

async fn orchestrator_with_platform() -> Orchestrator {
    Orchestrator::new(platform_gateway().await, fast_settings()).unwrap()
}

async fn wait_terminal(orchestrator: &Orchestrator, id: &str) -> Request {
    let mut updates = orchestrator.registry().subscribe();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let current = updates.borrow_and_update().get(id).cloned();
            if let Some(request) = current {
                if request.status.is_terminal() {
                    return request;
                }
            }
            updates.changed().await.unwrap();
        }
    })
    .await
    .expect("request did not reach a terminal state")
}

/// Answers each method from a fixed table and records the calls it saw.
struct ScriptedInvoker {
    answers: Vec<(&'static str, Value)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedInvoker {
    fn new(answers: Vec<(&'static str, Value)>) -> Self {
        Self {
            answers,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn invoke(&self, method: &str, _params: Value) -> Result<Value, InvokeError> {
        self.calls.lock().unwrap().push(method.to_string());
        self.answers
            .iter()
            .find(|(name, _)| *name == method)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| InvokeError::Rpc {
                code: -32601,
                message: format!("tool not found: {method}"),
            })
    }
}

#[tokio::test]
async fn test_deploy_request_completes_with_ordered_results() {
    let orchestrator = orchestrator_with_platform().await;

    let submitted = orchestrator
        .submit(
            "Please deploy this model",
            json!({ "customer_id": "acme", "model_id": "m1" }),
        )
        .await
        .unwrap();
    assert_eq!(submitted.status, RequestStatus::Pending);
    assert_eq!(submitted.intent.as_str(), "deploy_model");

    let done = wait_terminal(&orchestrator, &submitted.id).await;
    assert_eq!(done.status, RequestStatus::Completed, "error: {:?}", done.error);
    assert_eq!(done.workflow.as_deref(), Some("deploy_model"));
    assert_eq!(done.current_step.as_deref(), Some("validate_deployment"));
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());

    let result = done.result.unwrap();
    let keys: Vec<&str> = result.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["validate_customer", "allocate_gpu", "deploy_model", "validate_deployment"]
    );
    assert_eq!(
        result["validate_deployment"]["endpoint_url"],
        "http://vllm-m1.acme.svc.cluster.local:8000"
    );
    assert_eq!(result["allocate_gpu"]["pool_name"], "default-pool");
}

#[tokio::test]
async fn test_unknown_intent_fails_without_steps() {
    let orchestrator = orchestrator_with_platform().await;

    let submitted = orchestrator.submit("asdfasdf", json!({})).await.unwrap();
    let done = wait_terminal(&orchestrator, &submitted.id).await;

    assert_eq!(done.status, RequestStatus::Failed);
    assert!(done.error.unwrap().contains("Unknown intent: unknown"));
    assert!(done.workflow.is_none());
    assert!(done.current_step.is_none());
    assert!(done.result.is_none());
}

#[tokio::test]
async fn test_missing_customer_fails_first_step() {
    let orchestrator = orchestrator_with_platform().await;

    let submitted = orchestrator
        .submit("deploy my model", json!({ "model_id": "m1" }))
        .await
        .unwrap();
    let done = wait_terminal(&orchestrator, &submitted.id).await;

    assert_eq!(done.status, RequestStatus::Failed);
    assert_eq!(
        done.error.as_deref(),
        Some("Step 0 (validate_customer) failed: customer_id is required")
    );
    assert_eq!(done.current_step.as_deref(), Some("validate_customer"));
    assert!(done.result.is_none());
}

#[tokio::test]
async fn test_train_and_deploy_runs_to_completion() {
    let orchestrator = orchestrator_with_platform().await;

    let submitted = orchestrator
        .submit(
            "Fine-tune a LoRA on our support tickets",
            json!({
                "customer_id": "acme",
                "dataset_path": "s3://datasets/support.jsonl",
                "base_model": "llama-3-8b"
            }),
        )
        .await
        .unwrap();
    assert_eq!(submitted.intent.as_str(), "train_and_deploy");

    let done = wait_terminal(&orchestrator, &submitted.id).await;
    assert_eq!(done.status, RequestStatus::Completed, "error: {:?}", done.error);

    let result = done.result.unwrap();
    let job_id = result["start_training"]["job_id"].as_str().unwrap();
    let adapter = format!("adapter-{job_id}");
    assert_eq!(result["monitor_training"]["status"], "completed");
    assert_eq!(result["validate_adapter"]["adapter_id"], adapter.as_str());
    assert_eq!(result["deploy_model"]["adapter_id"], adapter.as_str());
    assert_eq!(
        result["deploy_model"]["endpoint_url"],
        "http://vllm-llama-3-8b.acme.svc.cluster.local:8000"
    );
}

#[tokio::test]
async fn test_low_savings_are_not_applied() {
    let invoker = Arc::new(ScriptedInvoker::new(vec![
        ("query_usage", json!({ "request_count": 10 })),
        (
            "recommend_optimization",
            json!({ "recommendations": [], "total_potential_savings": 50.0 }),
        ),
    ]));
    let orchestrator = Orchestrator::new(invoker.clone(), fast_settings()).unwrap();

    let submitted = orchestrator
        .submit("optimize my costs", json!({ "customer_id": "acme" }))
        .await
        .unwrap();
    let done = wait_terminal(&orchestrator, &submitted.id).await;

    assert_eq!(done.status, RequestStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result["present_recommendations"]["approved"], false);
    assert_eq!(result["apply_optimizations"]["applied"], false);
    assert_eq!(result["apply_optimizations"]["reason"], "Not approved");
    assert_eq!(invoker.calls(), ["query_usage", "recommend_optimization"]);
}

#[tokio::test]
async fn test_high_savings_are_applied() {
    let orchestrator = orchestrator_with_platform().await;

    let submitted = orchestrator
        .submit("find cheaper options", json!({ "customer_id": "acme" }))
        .await
        .unwrap();
    let done = wait_terminal(&orchestrator, &submitted.id).await;

    assert_eq!(done.status, RequestStatus::Completed, "error: {:?}", done.error);
    let result = done.result.unwrap();
    assert_eq!(result["present_recommendations"]["approved"], true);
    assert_eq!(result["apply_optimizations"]["applied"], true);
    assert_eq!(result["apply_optimizations"]["expected_savings"], json!(392.0));
}

#[tokio::test]
async fn test_tool_failure_aborts_workflow() {
    let invoker = Arc::new(ScriptedInvoker::new(vec![(
        "allocate_gpu",
        json!({ "claim_id": "claim-1" }),
    )]));
    let orchestrator = Orchestrator::new(invoker.clone(), fast_settings()).unwrap();

    let submitted = orchestrator
        .submit("deploy", json!({ "customer_id": "acme", "model_id": "m1" }))
        .await
        .unwrap();
    let done = wait_terminal(&orchestrator, &submitted.id).await;

    assert_eq!(done.status, RequestStatus::Failed);
    assert_eq!(
        done.error.as_deref(),
        Some("Step 2 (deploy_model) failed: gateway error -32601: tool not found: deploy_model")
    );
    assert_eq!(invoker.calls(), ["allocate_gpu", "deploy_model"]);
}

#[tokio::test]
async fn test_concurrent_requests_all_terminate() {
    let orchestrator = orchestrator_with_platform().await;

    let mut ids = Vec::new();
    for i in 0..20 {
        let text = if i % 2 == 0 { "deploy it" } else { "gibberish" };
        let request = orchestrator
            .submit(text, json!({ "customer_id": format!("c{i}"), "model_id": "m" }))
            .await
            .unwrap();
        ids.push(request.id);
    }

    for id in &ids {
        let done = wait_terminal(&orchestrator, id).await;
        assert!(done.status.is_terminal());
    }
    assert_eq!(orchestrator.list().len(), 20);
}

#[tokio::test]
async fn test_remote_gateway_outage_fails_request() {
    use gateway::GatewayClient;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let client = GatewayClient::with_timeout(&server.uri(), Duration::from_secs(2)).unwrap();
    let orchestrator = Orchestrator::new(Arc::new(client), fast_settings()).unwrap();

    let submitted = orchestrator
        .submit("deploy", json!({ "customer_id": "acme", "model_id": "m1" }))
        .await
        .unwrap();
    let done = wait_terminal(&orchestrator, &submitted.id).await;

    assert_eq!(done.status, RequestStatus::Failed);
    assert_eq!(
        done.error.as_deref(),
        Some("Step 1 (allocate_gpu) failed: gateway returned HTTP 502: upstream down")
    );
}
