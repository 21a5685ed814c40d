//! Workflow run model.
//!
//! One row per run in `workflow_runs`. Mutated only by the orchestrator
//! holding the run's claim, except for cancel requests and resume resets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownStatus;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    /// COMPLETED, FAILED and CANCELLED are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Terminal states that an explicit resume may reopen.
    pub fn is_resumable(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(RunStatus::Pending),
            "RUNNING" => Ok(RunStatus::Running),
            "COMPLETED" => Ok(RunStatus::Completed),
            "FAILED" => Ok(RunStatus::Failed),
            "CANCELLED" | "CANCELED" => Ok(RunStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for RunStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Database run record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run identifier (caller-supplied or generated).
    pub run_id: String,

    /// Name of the workflow definition this run executes.
    pub workflow_name: String,

    #[sqlx(try_from = "String")]
    pub status: RunStatus,

    /// Input payload (JSON).
    pub input: serde_json::Value,

    /// Final output, set when COMPLETED.
    pub output: Option<serde_json::Value>,

    /// Terminal error, set when FAILED or CANCELLED.
    pub error: Option<String>,

    /// Orchestrator currently holding the exclusive claim.
    pub owner: Option<String>,

    /// When the claim lapses if not renewed.
    pub claim_expires_at: Option<DateTime<Utc>>,

    /// Set by a cancel request, honored between steps.
    pub cancel_requested: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Build a fresh PENDING run.
    pub fn pending(new_run: NewRun) -> Self {
        let now = Utc::now();
        Self {
            run_id: new_run.run_id,
            workflow_name: new_run.workflow_name,
            status: RunStatus::Pending,
            input: new_run.input,
            output: None,
            error: None,
            owner: None,
            claim_expires_at: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `owner` may take or renew the claim at `now`.
    pub fn is_claimable_by(&self, owner: &str, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match (&self.owner, self.claim_expires_at) {
            (None, _) => true,
            (Some(current), _) if current == owner => true,
            (Some(_), Some(expires_at)) => expires_at <= now,
            (Some(_), None) => false,
        }
    }
}

/// Request to create a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
    pub run_id: String,
    pub workflow_name: String,
    pub input: serde_json::Value,
}

/// Terminal outcome written by `finish_run`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunCompletion {
    Completed(serde_json::Value),
    Failed(String),
    Cancelled,
}

impl RunCompletion {
    pub fn status(&self) -> RunStatus {
        match self {
            RunCompletion::Completed(_) => RunStatus::Completed,
            RunCompletion::Failed(_) => RunStatus::Failed,
            RunCompletion::Cancelled => RunStatus::Cancelled,
        }
    }

    pub fn output(&self) -> Option<&serde_json::Value> {
        match self {
            RunCompletion::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<String> {
        match self {
            RunCompletion::Completed(_) => None,
            RunCompletion::Failed(error) => Some(error.clone()),
            RunCompletion::Cancelled => Some("cancelled".to_string()),
        }
    }
}

/// Filter for listing runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub workflow_name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RunFilter {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn matches(&self, run: &WorkflowRun) -> bool {
        self.status.map_or(true, |s| s == run.status)
            && self
                .workflow_name
                .as_deref()
                .map_or(true, |w| w == run.workflow_name)
    }
}
