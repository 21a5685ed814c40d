//! HTTP handlers for the txflow API.
//!
//! This module contains all route handlers organized by domain.

pub mod bench;
pub mod health;
pub mod runs;

pub use health::{api_health, health_check};
