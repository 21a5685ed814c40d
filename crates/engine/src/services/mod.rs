//! Service layer for the txflow engine.
//!
//! Services sit between the HTTP handlers and the engine.

pub mod gateway;

pub use gateway::{Accepted, BenchResult, ExecutionGateway, RunOutcome};
