//! Workflow run API handlers.
//!
//! Trigger, poll, list, cancel and resume runs through the execution gateway.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::{RunFilter, RunStatus, StepRecord};
use crate::error::{AppError, AppResult};
use crate::services::{ExecutionGateway, RunOutcome};

/// Query parameters for triggering a run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerQuery {
    /// Wait for the run to finish before responding.
    #[serde(default)]
    pub sync: bool,
    /// Upper bound on the synchronous wait.
    pub timeout_ms: Option<u64>,
}

/// Request body for triggering a run. An empty body means `{}` input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub input: Option<Value>,
}

/// Query parameters for reading a run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetRunQuery {
    /// Wait up to this long for the run to become terminal.
    pub wait_ms: Option<u64>,
}

/// Query parameters for listing runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<String>,
    pub workflow: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn parse_input(body: &Bytes) -> AppResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    let request: TriggerRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))?;
    Ok(request
        .input
        .unwrap_or_else(|| Value::Object(Default::default())))
}

async fn trigger_run(
    gateway: &ExecutionGateway,
    workflow: &str,
    run_id: Option<String>,
    query: TriggerQuery,
    body: Bytes,
) -> AppResult<Response> {
    let input = parse_input(&body)?;

    if query.sync {
        let timeout = query.timeout_ms.map(Duration::from_millis);
        let outcome = gateway.trigger(workflow, run_id, input, timeout).await?;
        Ok((StatusCode::OK, Json(outcome)).into_response())
    } else {
        let accepted = gateway.start(workflow, run_id, input).await?;
        Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
    }
}

/// Trigger a run with a generated id.
///
/// POST /workflows/{name}/runs
pub async fn trigger(
    State(gateway): State<ExecutionGateway>,
    Path(workflow): Path<String>,
    Query(query): Query<TriggerQuery>,
    body: Bytes,
) -> AppResult<Response> {
    trigger_run(&gateway, &workflow, None, query, body).await
}

/// Trigger (or re-observe) a run with a caller-chosen id.
///
/// POST /workflows/{name}/runs/{run_id}
pub async fn trigger_with_id(
    State(gateway): State<ExecutionGateway>,
    Path((workflow, run_id)): Path<(String, String)>,
    Query(query): Query<TriggerQuery>,
    body: Bytes,
) -> AppResult<Response> {
    trigger_run(&gateway, &workflow, Some(run_id), query, body).await
}

/// Get a run, optionally waiting for it to finish.
///
/// GET /workflows/runs/{run_id}
pub async fn get(
    State(gateway): State<ExecutionGateway>,
    Path(run_id): Path<String>,
    Query(query): Query<GetRunQuery>,
) -> AppResult<Json<RunOutcome>> {
    let outcome = match query.wait_ms {
        Some(wait_ms) if wait_ms > 0 => gateway.poll(&run_id, Duration::from_millis(wait_ms)).await?,
        _ => gateway.status(&run_id).await?,
    };
    Ok(Json(outcome))
}

/// List runs, newest first.
///
/// GET /workflows/runs
pub async fn list(
    State(gateway): State<ExecutionGateway>,
    Query(query): Query<ListRunsQuery>,
) -> AppResult<Json<Vec<RunOutcome>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(|e| AppError::Validation(format!("unknown status '{}'", e.0)))?;

    let filter = RunFilter {
        status,
        workflow_name: query.workflow,
        limit: query.limit,
        offset: query.offset,
    };
    Ok(Json(gateway.list(&filter).await?))
}

/// Step records of a run.
///
/// GET /workflows/runs/{run_id}/steps
pub async fn steps(
    State(gateway): State<ExecutionGateway>,
    Path(run_id): Path<String>,
) -> AppResult<Json<Vec<StepRecord>>> {
    Ok(Json(gateway.steps(&run_id).await?))
}

/// POST /workflows/runs/{run_id}/cancel
pub async fn cancel(
    State(gateway): State<ExecutionGateway>,
    Path(run_id): Path<String>,
) -> AppResult<Json<RunOutcome>> {
    Ok(Json(gateway.cancel(&run_id).await?))
}

/// POST /workflows/runs/{run_id}/resume
pub async fn resume(
    State(gateway): State<ExecutionGateway>,
    Path(run_id): Path<String>,
) -> AppResult<(StatusCode, Json<RunOutcome>)> {
    Ok((StatusCode::ACCEPTED, Json(gateway.resume(&run_id).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::{default_registry, RetryPolicy};
    use crate::router::build_router;
    use crate::state::AppState;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> axum::Router {
        let config = AppConfig {
            store_backend: crate::config::StoreBackend::Memory,
            poll_interval_ms: 5,
            bench_steps: 2,
            ..AppConfig::default()
        };
        let gateway = ExecutionGateway::with_store(
            MemoryStore::new(),
            default_registry(config.bench_steps).unwrap(),
            RetryPolicy::immediate(3),
            &config,
        );
        build_router(AppState::new(gateway, config))
    }

    async fn send(app: &axum::Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_sync_trigger_returns_output() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/workflows/hello/runs/r-1?sync=true",
            r#"{"input": {"name": "ada"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_id"], "r-1");
        assert_eq!(body["status"], "COMPLETED");
        assert_eq!(body["output"], "Hello, ada! You have been greeted 1 times.");
        assert!(body["runtimeMs"].is_number());

        // Same id again reports the stored result.
        let (_, again) = send(&app, "POST", "/workflows/hello/runs/r-1?sync=true", "").await;
        assert_eq!(again["output"], body["output"]);
    }

    #[tokio::test]
    async fn test_async_trigger_then_poll() {
        let app = app();
        let (status, body) = send(&app, "POST", "/workflows/bench/runs", "").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = body["run_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "GET",
            &format!("/workflows/runs/{run_id}?wait_ms=5000"),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "COMPLETED");
        assert_eq!(body["workflow_name"], "bench");

        let (_, steps) = send(&app, "GET", &format!("/workflows/runs/{run_id}/steps"), "").await;
        assert_eq!(steps.as_array().unwrap().len(), 2);
        assert_eq!(steps[1]["status"], "COMMITTED");
    }

    #[tokio::test]
    async fn test_caller_errors() {
        let app = app();

        let (status, body) = send(&app, "POST", "/workflows/missing/runs?sync=true", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);

        let (status, _) = send(&app, "POST", "/workflows/hello/runs", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/workflows/runs/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/workflows/runs?status=SLEEPING", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_filters_by_workflow() {
        let app = app();
        send(&app, "POST", "/workflows/hello/runs/h-1?sync=true", "").await;
        send(&app, "POST", "/workflows/bench/runs/b-1?sync=true", "").await;

        let (status, body) = send(&app, "GET", "/workflows/runs?workflow=hello", "").await;
        assert_eq!(status, StatusCode::OK);
        let runs = body.as_array().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["run_id"], "h-1");
    }

    #[tokio::test]
    async fn test_resume_completed_run_rejected() {
        let app = app();
        send(&app, "POST", "/workflows/hello/runs/done?sync=true", "").await;

        let (status, _) = send(&app, "POST", "/workflows/runs/done/resume", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", "/workflows/runs/done/cancel", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn test_input_defaults() {
        assert_eq!(parse_input(&Bytes::from_static(b"")).unwrap(), json!({}));
        assert_eq!(parse_input(&Bytes::from_static(b"{}")).unwrap(), json!({}));
        assert_eq!(
            parse_input(&Bytes::from_static(br#"{"input": [1]}"#)).unwrap(),
            json!([1])
        );
    }
}
