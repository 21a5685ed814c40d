//! Error types for the txflow engine.
//!
//! Each layer has its own enum: [`StoreError`] for storage, [`StepError`]
//! for a single step transaction, [`WorkflowError`] for a run, and
//! [`AppError`] which implements `IntoResponse` for Axum handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Process exit code: run finished as FAILED or CANCELLED.
pub const EXIT_WORKFLOW_FAILED: i32 = 1;
/// Process exit code: request rejected before orchestration.
pub const EXIT_INVALID_INPUT: i32 = 2;
/// Process exit code: durable store could not be reached.
pub const EXIT_STORE_UNAVAILABLE: i32 = 3;

/// Errors raised by the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient failure: connection loss, pool timeout, serialization
    /// conflict, deadlock. Safe to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Integrity constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                match code.as_str() {
                    // serialization_failure, deadlock_detected
                    "40001" | "40P01" => StoreError::Unavailable(err.to_string()),
                    c if c.starts_with("23") => StoreError::Constraint(err.to_string()),
                    // connection exceptions, operator intervention, insufficient resources
                    c if c.starts_with("08") || c.starts_with("57") || c.starts_with("53") => {
                        StoreError::Unavailable(err.to_string())
                    }
                    _ => StoreError::Constraint(err.to_string()),
                }
            }
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Failure of one step transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Retryable: the transaction never committed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Fatal for this attempt.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The step could not interpret its input. Fatal.
    #[error("Invalid step input: {0}")]
    InvalidInput(String),
}

impl StepError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::StoreUnavailable(_))
    }
}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => StepError::StoreUnavailable(msg),
            StoreError::Serialization(e) => StepError::InvalidInput(e.to_string()),
            other => StepError::ConstraintViolation(other.to_string()),
        }
    }
}

/// Outcome errors of a workflow run.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Transient step failures outlasted the retry budget.
    #[error("Step '{step}' still unavailable after {attempts} attempts: {message}")]
    TransientStore {
        step: String,
        attempts: u32,
        message: String,
    },

    /// A step failed fatally.
    #[error("Step '{step}' failed: {message}")]
    Constraint { step: String, message: String },

    /// The log disagrees with the workflow definition.
    #[error("Replay inconsistency in run {run_id} at step {step_index}: {message}")]
    ReplayInconsistency {
        run_id: String,
        step_index: i32,
        message: String,
    },

    /// Malformed request, rejected before anything is logged.
    #[error("Invalid request: {0}")]
    Caller(String),

    /// The run id is not in the execution log. A caller error.
    #[error("Run {0} not found")]
    UnknownRun(String),

    /// Another orchestrator holds the claim on this run.
    #[error("Run {0} is already being executed")]
    AlreadyRunning(String),

    #[error("Run {0} was cancelled")]
    Cancelled(String),

    /// The run is terminal FAILED with the recorded error.
    #[error("Run {run_id} failed: {error}")]
    Failed { run_id: String, error: String },

    /// Execution log error
    #[error("Execution log error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Exit code for CLI or batch invocation.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkflowError::Caller(_) | WorkflowError::UnknownRun(_) => EXIT_INVALID_INPUT,
            WorkflowError::TransientStore { .. } => EXIT_STORE_UNAVAILABLE,
            WorkflowError::Store(e) if e.is_transient() => EXIT_STORE_UNAVAILABLE,
            _ => EXIT_WORKFLOW_FAILED,
        }
    }
}

/// Application-level errors for the HTTP surface.
#[derive(Error, Debug)]
pub enum AppError {
    /// Workflow error
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Direct step transaction error
    #[error(transparent)]
    Step(#[from] StepError),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Workflow(e) => match e {
                WorkflowError::Caller(_) => StatusCode::BAD_REQUEST,
                WorkflowError::UnknownRun(_) => StatusCode::NOT_FOUND,
                WorkflowError::AlreadyRunning(_) => StatusCode::CONFLICT,
                WorkflowError::TransientStore { .. } => StatusCode::SERVICE_UNAVAILABLE,
                WorkflowError::Store(s) if s.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                WorkflowError::Store(_) | WorkflowError::ReplayInconsistency { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                WorkflowError::Constraint { .. }
                | WorkflowError::Cancelled(_)
                | WorkflowError::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::Step(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Step(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
