//! Application state for the txflow server.
//!
//! Handed to handlers through Axum's state management.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::services::ExecutionGateway;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Entry point for all run operations
    pub gateway: ExecutionGateway,

    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(gateway: ExecutionGateway, config: AppConfig) -> Self {
        Self {
            gateway,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
