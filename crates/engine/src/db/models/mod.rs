//! Database models for the txflow engine.
//!
//! This module contains SQLx-compatible model definitions
//! for all database tables.

pub mod counter;
pub mod run;
pub mod step_record;

pub use counter::*;
pub use run::*;
pub use step_record::*;

/// A status column held a value outside the known set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown status value: {0}")]
pub struct UnknownStatus(pub String);
