//! HTTP surface of the tool gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, warn, Level};

use crate::protocol::{codes, split_method, RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};
use crate::registry::Gateway;

/// Build the gateway router with the standard layer stack.
pub fn router(gateway: Arc<Gateway>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(server_info))
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/execute", post(execute))
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
        .with_state(gateway)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "tool-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn server_info(State(gateway): State<Arc<Gateway>>) -> Json<Value> {
    Json(json!({
        "service": "tool-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": format!("jsonrpc-{JSONRPC_VERSION}"),
        "default_server": gateway.default_server(),
        "servers": gateway.servers().await,
    }))
}

#[derive(Debug, Deserialize)]
struct ToolsQuery {
    server: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolEntry {
    server: String,
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

async fn list_tools(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<ToolsQuery>,
) -> Response {
    let pairs = match query.server {
        Some(server) => match gateway.list_tools(&server).await {
            Ok(tools) => tools.into_iter().map(|t| (server.clone(), t)).collect(),
            Err(e) => {
                return (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() })))
                    .into_response()
            }
        },
        None => gateway.list_all_tools().await,
    };

    let mut tools: Vec<ToolEntry> = pairs
        .into_iter()
        .map(|(server, tool)| ToolEntry {
            server,
            name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema,
        })
        .collect();
    tools.sort_by(|a, b| (&a.server, &a.name).cmp(&(&b.server, &b.name)));

    let count = tools.len();
    Json(json!({ "tools": tools, "count": count })).into_response()
}

/// JSON-RPC entry point.
///
/// Envelope problems answer HTTP 400; anything past dispatch answers 200
/// with either `result` or `error` set.
async fn execute(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Rejecting unparseable JSON-RPC body");
            return envelope_error(codes::PARSE_ERROR, "Parse error", e.to_string(), Value::Null);
        }
    };

    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return envelope_error(codes::INVALID_REQUEST, "Invalid Request", e.to_string(), id);
        }
    };

    if request.jsonrpc != JSONRPC_VERSION || request.method.is_empty() {
        return envelope_error(
            codes::INVALID_REQUEST,
            "Invalid Request",
            format!("expected jsonrpc {JSONRPC_VERSION} with a method"),
            request.id,
        );
    }

    let (server, tool) = split_method(&request.method, gateway.default_server());
    debug!(server = %server, tool = %tool, "Dispatching JSON-RPC call");

    let response = match gateway.execute(server, tool, request.params).await {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(e) => {
            warn!(method = %request.method, error = %e, "Tool call failed");
            RpcResponse::failure(request.id, RpcError::from(&e))
        }
    };

    (StatusCode::OK, Json(response)).into_response()
}

fn envelope_error(code: i32, message: &str, detail: String, id: Value) -> Response {
    let response = RpcResponse::failure(id, RpcError::new(code, message, Some(Value::String(detail))));
    (StatusCode::BAD_REQUEST, Json(response)).into_response()
}
