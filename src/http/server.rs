//! HTTP surface for the evaluation engine.
//!
//! One operation (`POST /api/execute`) plus the injected history store and a
//! liveness probe. Evaluation results — including runtime faults and
//! timeouts — are HTTP 200; only a request whose shape is wrong before
//! admission gets a 4xx, and even that carries the structured rejection
//! body.

use crate::engine::Evaluator;
use crate::http::history::{HistoryRecord, HistoryStore};
use crate::http::wire::{self, WireResult};
use crate::observability::audit;
use crate::sandbox::capture;
use crate::types::{ErrorCategory, ErrorDetail, EvaluationRequest};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

/// Shared server state. The evaluator itself is stateless; the history
/// store is the only mutable thing here and is explicitly injected.
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<Evaluator>,
    pub history: Arc<Mutex<HistoryStore>>,
}

impl AppState {
    pub fn new(evaluator: Evaluator, history_capacity: usize) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            history: Arc::new(Mutex::new(HistoryStore::new(history_capacity))),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/execute", post(execute))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id", axum::routing::delete(delete_history))
        .route("/healthz", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn execute(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<WireResult>) {
    let request = match wire::parse_request(&body) {
        Ok(request) => request,
        Err(detail) => {
            return (StatusCode::BAD_REQUEST, Json(WireResult::rejection(detail)));
        }
    };

    let code = request.code.clone();
    let result = run_evaluation(&state, request).await;

    record_history(&state, code, &result);

    // Shape/size rejections are the caller's error; everything that actually
    // ran — including faults and timeouts — is a successful evaluation call.
    let status = match &result.error {
        Some(detail) if detail.category == ErrorCategory::AdmissionRejected => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::OK,
    };
    (status, Json(result))
}

/// The engine blocks its calling thread for up to the deadline, so it runs
/// on the blocking pool rather than a runtime worker.
async fn run_evaluation(state: &AppState, request: EvaluationRequest) -> WireResult {
    let evaluator = state.evaluator.clone();
    match tokio::task::spawn_blocking(move || evaluator.evaluate(&request)).await {
        Ok(result) => result.into(),
        Err(err) => {
            log::error!("evaluation task failed to join: {err}");
            WireResult::rejection(ErrorDetail::new(
                ErrorCategory::RuntimeFault,
                "evaluation terminated unexpectedly",
            ))
        }
    }
}

fn record_history(state: &AppState, code: String, result: &WireResult) {
    let record = HistoryRecord {
        id: audit::next_run_id(),
        code,
        success: result.success,
        error: result.error.as_ref().map(|detail| detail.message.clone()),
        execution_time_ms: result.execution_time,
        timestamp_ms: capture::now_ms(),
    };
    if let Ok(mut history) = state.history.lock() {
        history.push(record);
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_page_size")]
    limit: usize,
}

fn default_page_size() -> usize {
    50
}

async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<HistoryRecord>> {
    let records = state
        .history
        .lock()
        .map(|history| history.list(query.offset, query.limit))
        .unwrap_or_default();
    Json(records)
}

async fn delete_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    let removed = state
        .history
        .lock()
        .map(|mut history| history.delete(&id))
        .unwrap_or(false);
    if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn clear_history(State(state): State<AppState>) -> Json<Value> {
    let removed = state
        .history
        .lock()
        .map(|mut history| history.clear())
        .unwrap_or(0);
    Json(serde_json::json!({ "removed": removed }))
}

/// Liveness probe: run a canary snippet through the whole pipeline.
async fn health(State(state): State<AppState>) -> StatusCode {
    let result = run_evaluation(&state, EvaluationRequest::new("return 1;")).await;
    if result.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Evaluator::with_defaults(), 16)
    }

    async fn post_execute(state: AppState, body: Value) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn execute_round_trip() {
        let body = json!({
            "code": "return response.a + 1;",
            "context": { "response": { "a": 1 } }
        });
        let (status, result) = post_execute(test_state(), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["result"], json!(2));
    }

    #[tokio::test]
    async fn runtime_faults_are_http_200() {
        let (status, result) =
            post_execute(test_state(), json!({ "code": "throw new Error('x');" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error"]["category"], json!("RuntimeFault"));
    }

    #[tokio::test]
    async fn non_string_code_is_http_400_with_structured_body() {
        let (status, result) = post_execute(test_state(), json!({ "code": 123 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["console"], json!([]));
        assert_eq!(result["error"]["category"], json!("AdmissionRejected"));
    }

    #[tokio::test]
    async fn admission_rejections_are_http_400() {
        let (status, result) = post_execute(test_state(), json!({ "code": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error"]["category"], json!("AdmissionRejected"));
    }

    #[tokio::test]
    async fn executions_land_in_history_newest_first() {
        let state = test_state();
        let _ = post_execute(state.clone(), json!({ "code": "return 1;" })).await;
        let _ = post_execute(state.clone(), json!({ "code": "return 2;" })).await;

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/history?limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let records: Value = serde_json::from_slice(&bytes).unwrap();
        let records = records.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["code"], json!("return 2;"));
        assert_eq!(records[1]["code"], json!("return 1;"));
    }

    #[tokio::test]
    async fn health_probe_runs_the_canary() {
        let response = router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
