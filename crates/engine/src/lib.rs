//! txflow engine library
//!
//! A durable transactional workflow engine. Workflows are ordered lists of
//! transactional steps; every step of every run commits at most once, and a
//! run interrupted by a crash resumes from its execution log.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: PostgreSQL models, queries and schema
//! - [`store`]: Storage traits with PostgreSQL and in-memory backends
//! - [`engine`]: Step executor, orchestrator and workflow definitions
//! - [`services`]: The execution gateway
//! - [`handlers`] and [`router`]: The HTTP trigger API
//! - [`error`]: Error types and exit codes
//!
//! ## Example
//!
//! ```ignore
//! use txflow_engine::{
//!     config::{AppConfig, RetryConfig},
//!     engine::{default_registry, RetryPolicy},
//!     services::ExecutionGateway,
//!     store::MemoryStore,
//! };
//!
//! let config = AppConfig::default();
//! let gateway = ExecutionGateway::with_store(
//!     MemoryStore::new(),
//!     default_registry(config.bench_steps)?,
//!     RetryPolicy::from(&RetryConfig::default()),
//!     &config,
//! );
//! let outcome = gateway.trigger("hello", None, serde_json::json!({}), None).await?;
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod result_ext;
pub mod router;
pub mod services;
pub mod state;
pub mod store;

pub use error::{AppError, AppResult, WorkflowError};
pub use result_ext::ResultExt;
