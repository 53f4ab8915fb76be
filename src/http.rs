//! HTTP server and endpoints.
//!
//! - `GET /tools` — the flat tool catalog
//! - `POST /tool_call` — invoke one tool by name
//! - `GET /health` — lifecycle state and counts

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::bridge::{BridgeError, BridgeService, BridgeState};
use crate::mcp_client::ToolDescriptor;

/// Fields a `/tool_call` body must carry, in reporting order.
const REQUIRED_CALL_FIELDS: [&str; 2] = ["name", "arguments"];

/// Create the HTTP router with all endpoints.
pub fn create_router(service: Arc<BridgeService>) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tool_call", post(call_tool))
        .route("/health", get(health))
        .with_state(service)
}

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        match &self {
            BridgeError::ToolNotFound { .. } => {
                error_response(StatusCode::NOT_FOUND, self.to_string())
            }
            BridgeError::ShuttingDown => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            BridgeError::InvocationFailure { .. }
            | BridgeError::StartupFailure { .. }
            | BridgeError::RetrievalFailure { .. } => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Tool Call Failed: {self}"),
            ),
        }
    }
}

// ─── Endpoints ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ToolsResponse<'a> {
    tools: &'a [ToolDescriptor],
}

/// GET /tools - Always 200; empty list when no backend started.
async fn list_tools(State(service): State<Arc<BridgeService>>) -> Response {
    Json(ToolsResponse {
        tools: service.list_tools(),
    })
    .into_response()
}

/// POST /tool_call - `{"name": string, "arguments": object}`.
///
/// The body is parsed by hand so malformed input maps to the documented
/// 400 messages rather than the extractor's defaults.
async fn call_tool(State(service): State<Arc<BridgeService>>, body: Bytes) -> Response {
    let data: Value = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid JSON"),
    };
    let Some(fields) = data.as_object() else {
        return error_response(StatusCode::BAD_REQUEST, "Request body must be a JSON object");
    };

    let missing: Vec<&str> = REQUIRED_CALL_FIELDS
        .into_iter()
        .filter(|field| !fields.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Missing fields: {}", missing.join(", ")),
        );
    }

    let Some(name) = fields.get("name").and_then(Value::as_str) else {
        return error_response(StatusCode::BAD_REQUEST, "Field 'name' must be a string");
    };
    let arguments = match fields.get("arguments") {
        Some(arguments @ Value::Object(_)) => arguments.clone(),
        _ => {
            return error_response(StatusCode::BAD_REQUEST, "Field 'arguments' must be an object")
        }
    };

    match service.invoke_tool(name, arguments).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state: BridgeState,
    sessions: usize,
    tools: usize,
}

/// GET /health - 200 while ready, 503 once draining.
async fn health(State(service): State<Arc<BridgeService>>) -> impl IntoResponse {
    let state = service.state();
    let ready = state == BridgeState::Ready;
    let body = HealthResponse {
        status: if ready { "healthy" } else { "unavailable" },
        state,
        sessions: service.live_sessions(),
        tools: service.registry().len(),
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::testing::{FakeLauncher, FakeSession};
    use crate::mcp_client::BackendSpec;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    async fn empty_app() -> (Router, Arc<BridgeService>) {
        let (service, _) = BridgeService::start(&[], &FakeLauncher::new()).await;
        let service = Arc::new(service);
        (create_router(Arc::clone(&service)), service)
    }

    async fn app_with(sessions: &[(&str, &Arc<FakeSession>)]) -> (Router, Arc<BridgeService>) {
        let mut launcher = FakeLauncher::new();
        let mut specs = Vec::new();
        for (command, session) in sessions {
            launcher = launcher.serve(command, session);
            specs.push(BackendSpec::new(command, vec![]));
        }
        let (service, _) = BridgeService::start(&specs, &launcher).await;
        let service = Arc::new(service);
        (create_router(Arc::clone(&service)), service)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_call(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/tool_call")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_tools_empty_registry() {
        let (app, _) = empty_app().await;
        let (status, body) = send(app, get("/tools")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"tools": []}));
    }

    #[tokio::test]
    async fn test_tools_lists_duplicates() {
        let schema = json!({"type": "string"});
        let first = Arc::new(FakeSession::new(0, "first").with_tool("a", schema.clone()));
        let second = Arc::new(FakeSession::new(1, "second").with_tool("a", schema));
        let (app, _) = app_with(&[("first", &first), ("second", &second)]).await;

        let (status, body) = send(app, get("/tools")).await;
        assert_eq!(status, StatusCode::OK);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t["name"] == "a"));
        assert_eq!(tools[0]["parameters"], json!({"type": "string"}));
    }

    #[tokio::test]
    async fn test_call_missing_arguments() {
        let (app, _) = empty_app().await;
        let (status, body) = send(app, post_call(r#"{"name":"x"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing fields: arguments");
    }

    #[tokio::test]
    async fn test_call_missing_both_fields() {
        let (app, _) = empty_app().await;
        let (status, body) = send(app, post_call("{}")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing fields: name, arguments");
    }

    #[tokio::test]
    async fn test_call_invalid_json() {
        let (app, _) = empty_app().await;
        let (status, body) = send(app, post_call("{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn test_call_rejects_non_object_body() {
        let (app, _) = empty_app().await;
        let (status, _) = send(app, post_call(r#"["name", "arguments"]"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_call_rejects_mistyped_fields() {
        let (app, _) = empty_app().await;
        let (status, body) = send(app.clone(), post_call(r#"{"name": 5, "arguments": {}}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Field 'name' must be a string");

        let (status, body) = send(app, post_call(r#"{"name": "x", "arguments": [1]}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Field 'arguments' must be an object");
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let (app, _) = empty_app().await;
        let (status, body) =
            send(app, post_call(r#"{"name":"nonexistent","arguments":{}}"#)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Tool 'nonexistent' not found");
    }

    #[tokio::test]
    async fn test_call_success_returns_result() {
        let session = Arc::new(FakeSession::new(0, "fetch").with_tool("fetch", json!({})));
        let (app, _) = app_with(&[("fetch", &session)]).await;

        let (status, body) = send(
            app,
            post_call(r#"{"name":"fetch","arguments":{"url":"https://example.com"}}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isError"], false);
        assert_eq!(body["content"][0]["text"], "fetch handled fetch");
        assert_eq!(session.calls()[0].1, json!({"url": "https://example.com"}));
    }

    #[tokio::test]
    async fn test_call_backend_failure_is_500() {
        let session = Arc::new(
            FakeSession::new(0, "fs")
                .with_tool("write_file", json!({}))
                .failing_calls("permission denied"),
        );
        let (app, service) = app_with(&[("fs", &session)]).await;

        let (status, body) =
            send(app, post_call(r#"{"name":"write_file","arguments":{}}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Tool Call Failed: "));
        assert!(message.contains("permission denied"));
        assert_eq!(service.state(), BridgeState::Ready);
    }

    #[tokio::test]
    async fn test_call_after_shutdown_is_503() {
        let session = Arc::new(FakeSession::new(0, "s").with_tool("t", json!({})));
        let (app, service) = app_with(&[("s", &session)]).await;
        service.shutdown().await;

        let (status, _) = send(app.clone(), post_call(r#"{"name":"t","arguments":{}}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let session = Arc::new(
            FakeSession::new(0, "s")
                .with_tool("t1", json!({}))
                .with_tool("t2", json!({})),
        );
        let (app, _) = app_with(&[("s", &session)]).await;

        let (status, body) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["state"], "ready");
        assert_eq!(body["sessions"], 1);
        assert_eq!(body["tools"], 2);
    }
}
