//! PostgreSQL implementation of the store traits.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::db::models::{NewRun, RunCompletion, RunFilter, StepRecord, WorkflowRun};
use crate::db::queries::{counter, run, step_record};
use crate::db::{pool, DbPool};
use crate::error::StoreError;

use super::{DataStore, ExecutionLog, StoreTx};

/// Store backed by a shared sqlx pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// A transaction holding one pooled connection. sqlx rolls back and returns
/// the connection to the pool when this is dropped uncommitted.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn read_counter(&mut self, name: &str) -> Result<i64, StoreError> {
        counter::lock_counter(&mut self.tx, name).await
    }

    async fn write_counter(&mut self, name: &str, count: i64) -> Result<(), StoreError> {
        counter::write_counter(&mut self.tx, name, count).await
    }

    async fn record_commit(
        &mut self,
        run_id: &str,
        step_index: i32,
        output: &serde_json::Value,
    ) -> Result<(), StoreError> {
        step_record::record_commit(&mut self.tx, run_id, step_index, output).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn counter(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(counter::get_counter(&self.pool, name).await?.map(|c| c.count))
    }

    async fn health_check(&self) -> bool {
        pool::health_check(&self.pool).await
    }
}

#[async_trait]
impl ExecutionLog for PgStore {
    async fn create_run(&self, new_run: NewRun) -> Result<(WorkflowRun, bool), StoreError> {
        run::insert_run_if_absent(&self.pool, &new_run).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        run::get_run(&self.pool, run_id).await
    }

    async fn claim_run(
        &self,
        run_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        run::claim_run(&self.pool, run_id, owner, ttl).await
    }

    async fn release_run(&self, run_id: &str, owner: &str) -> Result<(), StoreError> {
        run::release_run(&self.pool, run_id, owner).await
    }

    async fn finish_run(
        &self,
        run_id: &str,
        owner: &str,
        completion: RunCompletion,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        run::finish_run(&self.pool, run_id, owner, &completion).await
    }

    async fn request_cancel(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        run::request_cancel(&self.pool, run_id).await
    }

    async fn reset_for_resume(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        run::reset_for_resume(&self.pool, run_id).await
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, StoreError> {
        run::list_runs(&self.pool, filter).await
    }

    async fn list_recoverable(&self, limit: i64) -> Result<Vec<WorkflowRun>, StoreError> {
        run::list_recoverable(&self.pool, limit).await
    }

    async fn record_start(
        &self,
        run_id: &str,
        step_index: i32,
        step_name: &str,
    ) -> Result<StepRecord, StoreError> {
        step_record::record_start(&self.pool, run_id, step_index, step_name).await
    }

    async fn record_failure(
        &self,
        run_id: &str,
        step_index: i32,
        error: &str,
    ) -> Result<(), StoreError> {
        step_record::record_failure(&self.pool, run_id, step_index, error).await
    }

    async fn lookup(&self, run_id: &str, step_index: i32) -> Result<Option<StepRecord>, StoreError> {
        step_record::lookup(&self.pool, run_id, step_index).await
    }

    async fn steps(&self, run_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        step_record::list_steps(&self.pool, run_id).await
    }
}
