//! HTTP API of the orchestrator.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, Level};

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;

/// Body of `POST /api/v1/requests`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub request: String,
    #[serde(default)]
    pub params: Value,
}

/// Build the orchestrator router.
pub fn router(orchestrator: Orchestrator, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/requests", post(submit_request))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/workflows", get(list_workflows))
        .route("/api/v1/workflow-definitions", get(list_definitions))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(orchestrator)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "orchestrator",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn submit_request(
    State(orchestrator): State<Orchestrator>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match orchestrator.submit(&body.request, body.params).await {
        Ok(request) => Json(request).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_request(State(orchestrator): State<Orchestrator>, Path(id): Path<String>) -> Response {
    match orchestrator.get(&id) {
        Ok(request) => Json(request).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_workflows(State(orchestrator): State<Orchestrator>) -> Json<Value> {
    let workflows = orchestrator.list();
    let count = workflows.len();
    Json(json!({ "workflows": workflows, "count": count }))
}

async fn list_definitions(State(orchestrator): State<Orchestrator>) -> Json<Value> {
    let definitions = orchestrator.workflows();
    let count = definitions.len();
    Json(json!({ "definitions": definitions, "count": count }))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            _ => {
                error!(error = %self, "Request handling failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}
