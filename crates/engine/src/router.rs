//! Route table for the txflow server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::api_health))
        .with_state(state.clone());

    let run_routes = Router::new()
        .route("/workflows/{name}/runs", post(handlers::runs::trigger))
        .route(
            "/workflows/{name}/runs/{run_id}",
            post(handlers::runs::trigger_with_id),
        )
        .route("/workflows/runs", get(handlers::runs::list))
        .route("/workflows/runs/{run_id}", get(handlers::runs::get))
        .route("/workflows/runs/{run_id}/steps", get(handlers::runs::steps))
        .route(
            "/workflows/runs/{run_id}/cancel",
            post(handlers::runs::cancel),
        )
        .route(
            "/workflows/runs/{run_id}/resume",
            post(handlers::runs::resume),
        )
        .with_state(state.gateway.clone());

    let bench_routes = Router::new()
        .route("/bare/{num}", get(handlers::bench::bare))
        .route("/txn/{num}", get(handlers::bench::txn))
        .route("/wf/{num}", get(handlers::bench::wf))
        .with_state(state.gateway);

    Router::new()
        .merge(health_routes)
        .merge(run_routes)
        .merge(bench_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
