//! Latency benchmark endpoints.

use std::time::Instant;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::services::{BenchResult, ExecutionGateway};

#[derive(Debug, Serialize, Deserialize)]
pub struct BareResponse {
    pub output: String,
    /// Handler time in milliseconds.
    pub runtime: f64,
}

/// Baseline with no store access.
///
/// GET /bare/{num}
pub async fn bare(Path(num): Path<u64>) -> Json<BareResponse> {
    let start = Instant::now();
    let output = format!("hello world {num}!");
    let runtime = start.elapsed().as_secs_f64() * 1000.0;
    Json(BareResponse { output, runtime })
}

/// One transaction on counter `dbos-{num}`, without a workflow.
///
/// GET /txn/{num}
pub async fn txn(
    State(gateway): State<ExecutionGateway>,
    Path(num): Path<usize>,
) -> AppResult<Json<BenchResult>> {
    Ok(Json(gateway.txn(num).await?))
}

/// A `bench` workflow run of `num` transactions, answered when it finishes.
/// `runtime` is in nanoseconds, as for `/txn`.
///
/// GET /wf/{num}
pub async fn wf(
    State(gateway): State<ExecutionGateway>,
    Path(num): Path<u64>,
) -> AppResult<Json<BenchResult>> {
    Ok(Json(gateway.wf(num).await?))
}
