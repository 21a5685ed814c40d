//! Configuration module for the txflow server.
//!
//! This module provides configuration loading from environment variables
//! using the `envy` crate for type-safe environment variable parsing.

mod app;
mod database;
mod retry;

pub use app::{AppConfig, StoreBackend};
pub use database::DatabaseConfig;
pub use retry::RetryConfig;
