//! txflow server
//!
//! Serves the workflow trigger API over HTTP, backed by PostgreSQL or by
//! the in-process store.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txflow_engine::{
    config::{AppConfig, DatabaseConfig, RetryConfig, StoreBackend},
    db::{create_pool, schema},
    engine::{default_registry, RetryPolicy},
    error::EXIT_STORE_UNAVAILABLE,
    router::build_router,
    services::ExecutionGateway,
    state::AppState,
    store::{MemoryStore, PgStore},
    ResultExt,
};

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,txflow_engine=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Open the configured backend. Exits with the store-unavailable code if
/// PostgreSQL cannot be reached.
async fn open_gateway(app_config: &AppConfig, retry: RetryPolicy) -> anyhow::Result<ExecutionGateway> {
    let registry = default_registry(app_config.bench_steps)?;

    match app_config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; runs do not survive a restart");
            Ok(ExecutionGateway::with_store(
                MemoryStore::new(),
                registry,
                retry,
                app_config,
            ))
        }
        StoreBackend::Postgres => {
            let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load database config, using defaults");
                DatabaseConfig::default()
            });

            let pool = match create_pool(&db_config)
                .await
                .log("connecting to PostgreSQL")
            {
                Ok(pool) => pool,
                Err(_) => std::process::exit(EXIT_STORE_UNAVAILABLE),
            };
            schema::ensure_schema(&pool).await?;

            let store = Arc::new(PgStore::new(pool));
            Ok(ExecutionGateway::new(
                store.clone(),
                store,
                registry,
                retry,
                app_config,
            ))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let app_config = AppConfig::from_env();
    init_tracing(app_config.as_ref().map(|c| c.log_json).unwrap_or(false));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting txflow server");

    let app_config = app_config.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });
    let retry_config = RetryConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load retry config, using defaults");
        RetryConfig::default()
    });

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        store = ?app_config.store_backend,
        max_attempts = retry_config.max_attempts,
        "Configuration loaded"
    );

    let gateway = open_gateway(&app_config, RetryPolicy::from(&retry_config)).await?;

    if app_config.recover_on_start {
        let _ = gateway.recover().await.log("recovering unfinished runs");
    }

    let state = AppState::new(gateway, app_config.clone());
    let app = build_router(state);

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    // Run the server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
