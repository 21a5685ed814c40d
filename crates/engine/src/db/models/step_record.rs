//! Step record model: one row per (run, step index) in `step_records`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownStatus;

/// Step attempt status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// An attempt began; no outcome recorded yet.
    Started,
    /// Output recorded. Never overwritten.
    Committed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Started => "STARTED",
            StepStatus::Committed => "COMMITTED",
            StepStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STARTED" => Ok(StepStatus::Started),
            "COMMITTED" => Ok(StepStatus::Committed),
            "FAILED" => Ok(StepStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for StepStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Database step record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: String,

    /// Zero-based position in the workflow definition.
    pub step_index: i32,

    pub step_name: String,

    #[sqlx(try_from = "String")]
    pub status: StepStatus,

    /// Recorded output (JSON) once committed.
    pub output: Option<serde_json::Value>,

    pub error: Option<String>,

    /// Number of attempts started.
    pub attempts: i32,

    pub updated_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn started(run_id: &str, step_index: i32, step_name: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            step_index,
            step_name: step_name.to_string(),
            status: StepStatus::Started,
            output: None,
            error: None,
            attempts: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status == StepStatus::Committed
    }
}
