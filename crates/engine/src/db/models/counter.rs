//! Counter model: the business data mutated by greeting steps.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the `counters` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counter {
    pub name: String,
    pub count: i64,
}
