//! In-process store used by tests and by `TXFLOW_STORE_BACKEND=memory`.
//!
//! Transactions are serialized on a single lock over the counter table.
//! Writes, including step commit records, are staged on the transaction and
//! applied together on commit, so a dropped or failed transaction leaves no
//! trace.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::models::{
    NewRun, RunCompletion, RunFilter, RunStatus, StepRecord, StepStatus, WorkflowRun,
};
use crate::error::StoreError;

use super::{DataStore, ExecutionLog, StoreTx};

#[derive(Default)]
struct LogState {
    runs: HashMap<String, WorkflowRun>,
    steps: BTreeMap<(String, i32), StepRecord>,
    corrupt: HashSet<(String, i32)>,
}

impl LogState {
    fn check_committable(&self, run_id: &str, step_index: i32) -> Result<(), StoreError> {
        match self.steps.get(&(run_id.to_string(), step_index)) {
            Some(record) if record.is_committed() => Err(StoreError::Constraint(format!(
                "step {run_id}/{step_index} is already committed"
            ))),
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!(
                "step {run_id}/{step_index} was never started"
            ))),
        }
    }
}

/// Memory-backed [`DataStore`] and [`ExecutionLog`].
///
/// Clones share state. Faults can be injected to exercise retry paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    counters: Arc<Mutex<HashMap<String, i64>>>,
    log: Arc<Mutex<LogState>>,
    failing_commits: Arc<AtomicU32>,
    log_down: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` transaction commits fail as unavailable.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Simulate the execution log being unreachable.
    pub fn set_log_available(&self, available: bool) {
        self.log_down.store(!available, Ordering::SeqCst);
    }

    /// Make `lookup` of one step fail as an undecodable row.
    pub async fn corrupt_step(&self, run_id: &str, step_index: i32) {
        self.log
            .lock()
            .await
            .corrupt
            .insert((run_id.to_string(), step_index));
    }

    fn check_log(&self) -> Result<(), StoreError> {
        if self.log_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("execution log unreachable".to_string()));
        }
        Ok(())
    }
}

fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn ttl_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

struct MemoryTx {
    committed: OwnedMutexGuard<HashMap<String, i64>>,
    staged: HashMap<String, i64>,
    staged_steps: Vec<(String, i32, serde_json::Value)>,
    log: Arc<Mutex<LogState>>,
    failing_commits: Arc<AtomicU32>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn read_counter(&mut self, name: &str) -> Result<i64, StoreError> {
        let value = self
            .staged
            .get(name)
            .or_else(|| self.committed.get(name))
            .copied()
            .unwrap_or(0);
        Ok(value)
    }

    async fn write_counter(&mut self, name: &str, count: i64) -> Result<(), StoreError> {
        if count < 0 {
            return Err(StoreError::Constraint(format!(
                "counter {name} cannot be negative ({count})"
            )));
        }
        self.staged.insert(name.to_string(), count);
        Ok(())
    }

    async fn record_commit(
        &mut self,
        run_id: &str,
        step_index: i32,
        output: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.log.lock().await.check_committable(run_id, step_index)?;
        if self
            .staged_steps
            .iter()
            .any(|(id, idx, _)| id == run_id && *idx == step_index)
        {
            return Err(StoreError::Constraint(format!(
                "step {run_id}/{step_index} is already committed"
            )));
        }
        self.staged_steps
            .push((run_id.to_string(), step_index, output.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut committed,
            staged,
            staged_steps,
            log,
            failing_commits,
        } = *self;

        if take_fault(&failing_commits) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        let mut log = log.lock().await;
        for (run_id, step_index, _) in &staged_steps {
            log.check_committable(run_id, *step_index)?;
        }
        committed.extend(staged);
        let now = Utc::now();
        for (run_id, step_index, output) in staged_steps {
            if let Some(record) = log.steps.get_mut(&(run_id, step_index)) {
                record.status = StepStatus::Committed;
                record.output = Some(output);
                record.error = None;
                record.updated_at = now;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let committed = self.counters.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            committed,
            staged: HashMap::new(),
            staged_steps: Vec::new(),
            log: self.log.clone(),
            failing_commits: self.failing_commits.clone(),
        }))
    }

    async fn counter(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.counters.lock().await.get(name).copied())
    }

    async fn health_check(&self) -> bool {
        !self.log_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionLog for MemoryStore {
    async fn create_run(&self, new_run: NewRun) -> Result<(WorkflowRun, bool), StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        if let Some(existing) = state.runs.get(&new_run.run_id) {
            return Ok((existing.clone(), false));
        }
        let run = WorkflowRun::pending(new_run);
        state.runs.insert(run.run_id.clone(), run.clone());
        Ok((run, true))
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        self.check_log()?;
        Ok(self.log.lock().await.runs.get(run_id).cloned())
    }

    async fn claim_run(
        &self,
        run_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        let now = Utc::now();
        let Some(run) = state.runs.get_mut(run_id) else {
            return Ok(None);
        };
        if !run.is_claimable_by(owner, now) {
            return Ok(None);
        }
        run.status = RunStatus::Running;
        run.owner = Some(owner.to_string());
        run.claim_expires_at = Some(now + ttl_delta(ttl));
        run.updated_at = now;
        Ok(Some(run.clone()))
    }

    async fn release_run(&self, run_id: &str, owner: &str) -> Result<(), StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        if let Some(run) = state.runs.get_mut(run_id) {
            if run.owner.as_deref() == Some(owner) {
                run.owner = None;
                run.claim_expires_at = None;
                run.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: &str,
        owner: &str,
        completion: RunCompletion,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        let Some(run) = state.runs.get_mut(run_id) else {
            return Ok(None);
        };
        if run.owner.as_deref() != Some(owner) || run.status != RunStatus::Running {
            return Ok(None);
        }
        run.status = completion.status();
        run.output = completion.output().cloned();
        run.error = completion.error();
        run.owner = None;
        run.claim_expires_at = None;
        run.updated_at = Utc::now();
        Ok(Some(run.clone()))
    }

    async fn request_cancel(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        let Some(run) = state.runs.get_mut(run_id) else {
            return Ok(None);
        };
        if !run.status.is_terminal() {
            run.cancel_requested = true;
            if run.owner.is_none() && run.status == RunStatus::Pending {
                run.status = RunStatus::Cancelled;
                run.error = RunCompletion::Cancelled.error();
            }
            run.updated_at = Utc::now();
        }
        Ok(Some(run.clone()))
    }

    async fn reset_for_resume(&self, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        let Some(run) = state.runs.get_mut(run_id) else {
            return Ok(None);
        };
        if !run.status.is_resumable() {
            return Ok(None);
        }
        run.status = RunStatus::Pending;
        run.output = None;
        run.error = None;
        run.owner = None;
        run.claim_expires_at = None;
        run.cancel_requested = false;
        run.updated_at = Utc::now();
        Ok(Some(run.clone()))
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, StoreError> {
        self.check_log()?;
        let state = self.log.lock().await;
        let mut runs: Vec<WorkflowRun> = state
            .runs
            .values()
            .filter(|run| filter.matches(run))
            .cloned()
            .collect();
        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(runs
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn list_recoverable(&self, limit: i64) -> Result<Vec<WorkflowRun>, StoreError> {
        self.check_log()?;
        let state = self.log.lock().await;
        let now = Utc::now();
        let mut runs: Vec<WorkflowRun> = state
            .runs
            .values()
            .filter(|run| {
                !run.status.is_terminal()
                    && (run.owner.is_none() || run.claim_expires_at.is_some_and(|at| at <= now))
            })
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn record_start(
        &self,
        run_id: &str,
        step_index: i32,
        step_name: &str,
    ) -> Result<StepRecord, StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        if !state.runs.contains_key(run_id) {
            return Err(StoreError::Constraint(format!(
                "step record references unknown run {run_id}"
            )));
        }

        let key = (run_id.to_string(), step_index);
        let record = state
            .steps
            .entry(key)
            .and_modify(|record| {
                if !record.is_committed() {
                    record.step_name = step_name.to_string();
                    record.status = StepStatus::Started;
                    record.error = None;
                    record.attempts += 1;
                    record.updated_at = Utc::now();
                }
            })
            .or_insert_with(|| StepRecord::started(run_id, step_index, step_name));
        Ok(record.clone())
    }

    async fn record_failure(
        &self,
        run_id: &str,
        step_index: i32,
        error: &str,
    ) -> Result<(), StoreError> {
        self.check_log()?;
        let mut state = self.log.lock().await;
        if let Some(record) = state.steps.get_mut(&(run_id.to_string(), step_index)) {
            if !record.is_committed() {
                record.status = StepStatus::Failed;
                record.error = Some(error.to_string());
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn lookup(&self, run_id: &str, step_index: i32) -> Result<Option<StepRecord>, StoreError> {
        self.check_log()?;
        let state = self.log.lock().await;
        let key = (run_id.to_string(), step_index);
        if state.corrupt.contains(&key) {
            return Err(StoreError::Corrupt(format!(
                "step {run_id}/{step_index}: output is not valid JSON"
            )));
        }
        Ok(state.steps.get(&key).cloned())
    }

    async fn steps(&self, run_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        self.check_log()?;
        let state = self.log.lock().await;
        Ok(state
            .steps
            .values()
            .filter(|record| record.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_run(run_id: &str) -> NewRun {
        NewRun {
            run_id: run_id.to_string(),
            workflow_name: "hello".to_string(),
            input: json!({}),
        }
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.read_counter("dbos").await.unwrap(), 0);
        tx.write_counter("dbos", 1).await.unwrap();
        assert_eq!(tx.read_counter("dbos").await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert_eq!(store.counter("dbos").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.write_counter("dbos", 5).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.write_counter("dbos", 7).await.unwrap();
        }

        assert_eq!(store.counter("dbos").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_writes() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);

        let mut tx = store.begin().await.unwrap();
        tx.write_counter("dbos", 1).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.counter("dbos").await.unwrap(), None);

        let mut tx = store.begin().await.unwrap();
        tx.write_counter("dbos", 1).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.counter("dbos").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_negative_counter_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.write_counter("dbos", -1).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_create_run_is_idempotent() {
        let store = MemoryStore::new();
        let (_, created) = store.create_run(new_run("r-1")).await.unwrap();
        assert!(created);
        let (run, created) = store.create_run(new_run("r-1")).await.unwrap();
        assert!(!created);
        assert_eq!(run.status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn test_claim_exclusive_until_expiry() {
        let store = MemoryStore::new();
        store.create_run(new_run("r-1")).await.unwrap();

        let claimed = store
            .claim_run("r-1", "a", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, RunStatus::Running);
        assert!(store
            .claim_run("r-1", "b", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());

        // A zero TTL lapses immediately.
        store.claim_run("r-1", "a", Duration::ZERO).await.unwrap();
        let stolen = store
            .claim_run("r-1", "b", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(stolen.unwrap().owner.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_finish_requires_claim() {
        let store = MemoryStore::new();
        store.create_run(new_run("r-1")).await.unwrap();
        store.claim_run("r-1", "a", Duration::from_secs(60)).await.unwrap();

        let lost = store
            .finish_run("r-1", "b", RunCompletion::Completed(json!("x")))
            .await
            .unwrap();
        assert!(lost.is_none());

        let done = store
            .finish_run("r-1", "a", RunCompletion::Completed(json!("x")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.owner.is_none());
        assert!(store
            .claim_run("r-1", "a", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_pending_run_immediately() {
        let store = MemoryStore::new();
        store.create_run(new_run("r-1")).await.unwrap();
        let run = store.request_cancel("r-1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);

        let reopened = store.reset_for_resume("r-1").await.unwrap().unwrap();
        assert_eq!(reopened.status, RunStatus::Pending);
        assert!(!reopened.cancel_requested);
    }

    #[tokio::test]
    async fn test_cancel_claimed_run_only_flags() {
        let store = MemoryStore::new();
        store.create_run(new_run("r-1")).await.unwrap();
        store.claim_run("r-1", "a", Duration::from_secs(60)).await.unwrap();

        let run = store.request_cancel("r-1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.cancel_requested);
    }

    #[tokio::test]
    async fn test_step_records() {
        let store = MemoryStore::new();
        let err = store.record_start("missing", 0, "s").await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        store.create_run(new_run("r-1")).await.unwrap();
        store.record_start("r-1", 0, "s").await.unwrap();
        store.record_failure("r-1", 0, "busy").await.unwrap();
        let retried = store.record_start("r-1", 0, "s").await.unwrap();
        assert_eq!(retried.attempts, 2);
        assert_eq!(retried.status, StepStatus::Started);

        let mut tx = store.begin().await.unwrap();
        tx.record_commit("r-1", 0, &json!(1)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.record_commit("r-1", 0, &json!(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        let err = tx.record_commit("r-1", 1, &json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        drop(tx);

        let restarted = store.record_start("r-1", 0, "s").await.unwrap();
        assert!(restarted.is_committed());
        assert_eq!(restarted.attempts, 2);
        assert_eq!(restarted.output, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_commit_record_applies_with_writes() {
        let store = MemoryStore::new();
        store.create_run(new_run("r-1")).await.unwrap();
        store.record_start("r-1", 0, "s").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.write_counter("dbos", 1).await.unwrap();
        tx.record_commit("r-1", 0, &json!("one")).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(!store.lookup("r-1", 0).await.unwrap().unwrap().is_committed());

        store.fail_next_commits(1);
        let mut tx = store.begin().await.unwrap();
        tx.write_counter("dbos", 1).await.unwrap();
        tx.record_commit("r-1", 0, &json!("one")).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(!store.lookup("r-1", 0).await.unwrap().unwrap().is_committed());
        assert_eq!(store.counter("dbos").await.unwrap(), None);

        let mut tx = store.begin().await.unwrap();
        tx.write_counter("dbos", 1).await.unwrap();
        tx.record_commit("r-1", 0, &json!("one")).await.unwrap();
        tx.commit().await.unwrap();
        let record = store.lookup("r-1", 0).await.unwrap().unwrap();
        assert_eq!(record.output, Some(json!("one")));
        assert_eq!(store.counter("dbos").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_corrupt_step_lookup() {
        let store = MemoryStore::new();
        store.create_run(new_run("r-1")).await.unwrap();
        store.record_start("r-1", 0, "s").await.unwrap();
        store.corrupt_step("r-1", 0).await;

        let err = store.lookup("r-1", 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert!(store.lookup("r-1", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_steps_ordered_by_index() {
        let store = MemoryStore::new();
        store.create_run(new_run("r-1")).await.unwrap();
        store.create_run(new_run("r-2")).await.unwrap();
        for idx in [2, 0, 1] {
            store.record_start("r-1", idx, "s").await.unwrap();
        }
        store.record_start("r-2", 0, "s").await.unwrap();

        let indexes: Vec<i32> = store
            .steps("r-1")
            .await
            .unwrap()
            .iter()
            .map(|r| r.step_index)
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_recoverable_skips_live_claims() {
        let store = MemoryStore::new();
        store.create_run(new_run("idle")).await.unwrap();
        store.create_run(new_run("held")).await.unwrap();
        store.create_run(new_run("done")).await.unwrap();
        store
            .claim_run("held", "a", Duration::from_secs(60))
            .await
            .unwrap();
        store.claim_run("done", "a", Duration::from_secs(60)).await.unwrap();
        store
            .finish_run("done", "a", RunCompletion::Failed("boom".into()))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list_recoverable(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.run_id)
            .collect();
        assert_eq!(ids, vec!["idle".to_string()]);
    }

    #[tokio::test]
    async fn test_log_outage() {
        let store = MemoryStore::new();
        store.set_log_available(false);
        let err = store.create_run(new_run("r-1")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!store.health_check().await);
    }
}
