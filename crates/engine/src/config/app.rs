//! Application configuration for the txflow server.

use std::time::Duration;

use serde::Deserialize;

/// Which storage backend the engine runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// PostgreSQL via the shared connection pool.
    Postgres,
    /// In-process store. State is lost on restart.
    Memory,
}

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `TXFLOW_`:
/// - `TXFLOW_HOST`: Server bind address (default: "0.0.0.0")
/// - `TXFLOW_PORT`: Server port (default: 8086)
/// - `TXFLOW_STORE_BACKEND`: `postgres` or `memory` (default: postgres)
/// - `TXFLOW_LOG_JSON`: Emit JSON logs (default: false)
/// - `TXFLOW_POLL_INTERVAL_MS`: Sleep between run status checks (default: 50)
/// - `TXFLOW_SYNC_TIMEOUT_MS`: Default wait for synchronous triggers (default: 30000)
/// - `TXFLOW_CLAIM_TTL_SECS`: Lifetime of a run claim (default: 60)
/// - `TXFLOW_BENCH_STEPS`: Number of steps in the `bench` workflow (default: 10)
/// - `TXFLOW_RECOVER_ON_START`: Re-drive unfinished runs at startup (default: true)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server name for identification; also the claim owner prefix
    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Claim lease. Renewed at step boundaries and every third of the
    /// lease while a step executes.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,

    #[serde(default = "default_bench_steps")]
    pub bench_steps: usize,

    #[serde(default = "default_true")]
    pub recover_on_start: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_server_name() -> String {
    "txflow-server".to_string()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Postgres
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}

fn default_claim_ttl_secs() -> u64 {
    60
}

fn default_bench_steps() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `TXFLOW_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("TXFLOW_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
            store_backend: default_store_backend(),
            log_json: false,
            poll_interval_ms: default_poll_interval_ms(),
            sync_timeout_ms: default_sync_timeout_ms(),
            claim_ttl_secs: default_claim_ttl_secs(),
            bench_steps: default_bench_steps(),
            recover_on_start: true,
        }
    }
}
