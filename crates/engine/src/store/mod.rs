//! Durable storage seams.
//!
//! [`DataStore`] hands out one transaction at a time for step execution.
//! [`ExecutionLog`] persists runs and step records. Both are implemented by
//! [`PgStore`] for PostgreSQL and [`MemoryStore`] for a single process.

use std::time::Duration;

use async_trait::async_trait;

use crate::db::models::{NewRun, RunCompletion, RunFilter, StepRecord, WorkflowRun};
use crate::error::StoreError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One atomic unit of work against the business data.
///
/// Dropping a transaction without calling [`StoreTx::commit`] rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    /// Read a counter (0 when absent) and lock it until the transaction ends.
    async fn read_counter(&mut self, name: &str) -> Result<i64, StoreError>;

    async fn write_counter(&mut self, name: &str, count: i64) -> Result<(), StoreError>;

    /// Mark a STARTED step COMMITTED with `output`, as part of this
    /// transaction. The step's effect and its commit record become durable
    /// together or not at all.
    ///
    /// Fails with [`StoreError::Constraint`] if the step is already
    /// COMMITTED and [`StoreError::NotFound`] if it was never started.
    async fn record_commit(
        &mut self,
        run_id: &str,
        step_index: i32,
        output: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Make all writes durable and visible. On error nothing is applied.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Source of step transactions.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Open a transaction on a connection checked out for its lifetime.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Committed value of a counter, outside any transaction.
    async fn counter(&self, name: &str) -> Result<Option<i64>, StoreError>;

    async fn health_check(&self) -> bool;
}

/// Durable record of runs and their steps.
///
/// Every method returns only after its write is durable. Commit records are
/// written through [`StoreTx::record_commit`] instead, inside the step's own
/// transaction.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Insert a PENDING run unless the id exists; returns the stored run
    /// and whether it was created by this call.
    async fn create_run(&self, new_run: NewRun) -> Result<(WorkflowRun, bool), StoreError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError>;

    /// Take or renew the exclusive claim and move the run to RUNNING.
    ///
    /// Returns `None` when the run is terminal, missing, or held by another
    /// owner whose claim has not expired.
    async fn claim_run(
        &self,
        run_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<WorkflowRun>, StoreError>;

    async fn release_run(&self, run_id: &str, owner: &str) -> Result<(), StoreError>;

    /// Write the terminal outcome; `None` if `owner` lost the claim.
    async fn finish_run(
        &self,
        run_id: &str,
        owner: &str,
        completion: RunCompletion,
    ) -> Result<Option<WorkflowRun>, StoreError>;

    /// Flag the run for cancellation; returns the run after the update.
    async fn request_cancel(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError>;

    /// Reopen a FAILED or CANCELLED run as PENDING; `None` otherwise.
    async fn reset_for_resume(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError>;

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, StoreError>;

    /// PENDING or RUNNING runs with no live claim.
    async fn list_recoverable(&self, limit: i64) -> Result<Vec<WorkflowRun>, StoreError>;

    async fn record_start(
        &self,
        run_id: &str,
        step_index: i32,
        step_name: &str,
    ) -> Result<StepRecord, StoreError>;

    async fn record_failure(
        &self,
        run_id: &str,
        step_index: i32,
        error: &str,
    ) -> Result<(), StoreError>;

    async fn lookup(&self, run_id: &str, step_index: i32) -> Result<Option<StepRecord>, StoreError>;

    async fn steps(&self, run_id: &str) -> Result<Vec<StepRecord>, StoreError>;
}
