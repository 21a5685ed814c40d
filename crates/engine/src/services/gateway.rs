//! Execution gateway.
//!
//! Entry point for triggering, observing and controlling runs. Validates
//! requests before anything is written, creates runs idempotently, and
//! hands orchestration to its own tokio task so that a caller giving up on
//! a synchronous trigger never stops the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::models::{NewRun, RunFilter, RunStatus, StepRecord, WorkflowRun};
use crate::engine::{
    BenchStep, Orchestrator, RetryPolicy, StepDescriptor, StepExecutor, StepInput,
    WorkflowDefinition, WorkflowRegistry, BENCH_WORKFLOW,
};
use crate::error::{StepError, WorkflowError};
use crate::result_ext::ResultExt;
use crate::store::{DataStore, ExecutionLog};

const MAX_RUN_ID_LEN: usize = 128;
const RECOVERY_BATCH: i64 = 1_000;

/// Observable state of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    pub workflow_name: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time the caller waited, for synchronous triggers.
    #[serde(rename = "runtimeMs", skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<f64>,
}

impl RunOutcome {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn with_runtime(mut self, started: Instant) -> Self {
        self.runtime_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        self
    }
}

impl From<WorkflowRun> for RunOutcome {
    fn from(run: WorkflowRun) -> Self {
        Self {
            run_id: run.run_id,
            workflow_name: run.workflow_name,
            status: run.status,
            output: run.output,
            error: run.error,
            runtime_ms: None,
        }
    }
}

/// Reply to an asynchronous start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accepted {
    pub run_id: String,
    pub status: RunStatus,
}

/// Reply of the `/txn` and `/wf` benchmark endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchResult {
    pub output: Value,
    /// Elapsed nanoseconds.
    pub runtime: u64,
}

#[derive(Clone)]
pub struct ExecutionGateway {
    registry: Arc<WorkflowRegistry>,
    store: Arc<dyn DataStore>,
    log: Arc<dyn ExecutionLog>,
    executor: StepExecutor,
    orchestrator: Orchestrator,
    poll_interval: Duration,
    sync_timeout: Duration,
}

impl ExecutionGateway {
    pub fn new(
        store: Arc<dyn DataStore>,
        log: Arc<dyn ExecutionLog>,
        registry: WorkflowRegistry,
        retry: RetryPolicy,
        config: &AppConfig,
    ) -> Self {
        let executor = StepExecutor::new(store.clone());
        let orchestrator = Orchestrator::new(
            log.clone(),
            executor.clone(),
            retry,
            config.server_name.clone(),
            config.claim_ttl(),
        );
        Self {
            registry: Arc::new(registry),
            store,
            log,
            executor,
            orchestrator,
            poll_interval: config.poll_interval(),
            sync_timeout: config.sync_timeout(),
        }
    }

    /// Build a gateway over one backend implementing both storage traits.
    pub fn with_store<S>(store: S, registry: WorkflowRegistry, retry: RetryPolicy, config: &AppConfig) -> Self
    where
        S: DataStore + ExecutionLog + 'static,
    {
        let store = Arc::new(store);
        Self::new(store.clone(), store, registry, retry, config)
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Trigger a run and wait up to `timeout` for it to finish.
    ///
    /// A terminal run is reported as stored. On timeout the outcome is
    /// whatever the run looks like at that moment (usually RUNNING) and the
    /// run keeps going in the background.
    pub async fn trigger(
        &self,
        workflow: &str,
        run_id: Option<String>,
        input: Value,
        timeout: Option<Duration>,
    ) -> Result<RunOutcome, WorkflowError> {
        let started = Instant::now();
        let timeout = timeout.unwrap_or(self.sync_timeout);
        let (def, run) = self.prepare(workflow, run_id, input).await?;

        if run.status.is_terminal() {
            return Ok(RunOutcome::from(run).with_runtime(started));
        }

        let run_id = run.run_id;
        let handle = self.spawn_run(def, run_id.clone());

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Err(err))) => match err {
                WorkflowError::TransientStore { .. }
                | WorkflowError::Store(_)
                | WorkflowError::Caller(_)
                | WorkflowError::UnknownRun(_) => return Err(err),
                // Recorded in the log; reported from there.
                _ => {}
            },
            Ok(Err(join_err)) => {
                warn!(run_id = %run_id, error = %join_err, "Orchestration task aborted");
            }
            Ok(Ok(Ok(_))) | Err(_) => {}
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        let outcome = self.poll(&run_id, remaining).await?;
        Ok(outcome.with_runtime(started))
    }

    /// Create the run if needed, start it in the background and return at once.
    pub async fn start(
        &self,
        workflow: &str,
        run_id: Option<String>,
        input: Value,
    ) -> Result<Accepted, WorkflowError> {
        let (def, run) = self.prepare(workflow, run_id, input).await?;
        if !run.status.is_terminal() {
            self.spawn_run(def, run.run_id.clone());
        }
        Ok(Accepted {
            run_id: run.run_id,
            status: run.status,
        })
    }

    /// Current state of a run, without waiting.
    pub async fn status(&self, run_id: &str) -> Result<RunOutcome, WorkflowError> {
        self.log
            .get_run(run_id)
            .await?
            .map(RunOutcome::from)
            .ok_or_else(|| WorkflowError::UnknownRun(run_id.to_string()))
    }

    /// Wait until the run is terminal or `timeout` elapses.
    ///
    /// Checks the log every `poll_interval`, sleeping in between.
    pub async fn poll(&self, run_id: &str, timeout: Duration) -> Result<RunOutcome, WorkflowError> {
        let deadline = Instant::now() + timeout;
        loop {
            let outcome = self.status(run_id).await?;
            let now = Instant::now();
            if outcome.is_terminal() || now >= deadline {
                return Ok(outcome);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Request cancellation. Takes effect at the next step boundary.
    pub async fn cancel(&self, run_id: &str) -> Result<RunOutcome, WorkflowError> {
        let run = self
            .log
            .request_cancel(run_id)
            .await?
            .ok_or_else(|| WorkflowError::UnknownRun(run_id.to_string()))?;
        info!(run_id = %run_id, status = %run.status, "Cancel requested");
        Ok(run.into())
    }

    /// Reopen a FAILED or CANCELLED run and start it again.
    ///
    /// Steps committed before the failure are replayed, not re-executed.
    pub async fn resume(&self, run_id: &str) -> Result<RunOutcome, WorkflowError> {
        let run = self
            .log
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::UnknownRun(run_id.to_string()))?;
        let def = self.registry.resolve(&run.workflow_name, &run.input)?;

        if !run.status.is_resumable() {
            return Err(WorkflowError::Caller(format!(
                "run {} is {} and cannot be resumed",
                run_id, run.status
            )));
        }
        let reopened = self
            .log
            .reset_for_resume(run_id)
            .await?
            .ok_or_else(|| WorkflowError::AlreadyRunning(run_id.to_string()))?;

        info!(run_id = %run_id, "Run resumed");
        self.spawn_run(def, run_id.to_string());
        Ok(reopened.into())
    }

    /// Re-drive runs left unfinished by a previous process. Returns how
    /// many were started.
    pub async fn recover(&self) -> Result<usize, WorkflowError> {
        let runs = self.log.list_recoverable(RECOVERY_BATCH).await?;
        let mut started = 0;
        for run in runs {
            match self.registry.resolve(&run.workflow_name, &run.input) {
                Ok(def) => {
                    debug!(run_id = %run.run_id, status = %run.status, "Recovering run");
                    self.spawn_run(def, run.run_id);
                    started += 1;
                }
                Err(err) => warn!(
                    run_id = %run.run_id,
                    workflow = %run.workflow_name,
                    error = %err,
                    "Skipping recovery of run"
                ),
            }
        }
        if started > 0 {
            info!(count = started, "Recovered unfinished runs");
        }
        Ok(started)
    }

    pub async fn list(&self, filter: &RunFilter) -> Result<Vec<RunOutcome>, WorkflowError> {
        let runs = self.log.list_runs(filter).await?;
        Ok(runs.into_iter().map(RunOutcome::from).collect())
    }

    pub async fn steps(&self, run_id: &str) -> Result<Vec<StepRecord>, WorkflowError> {
        if self.log.get_run(run_id).await?.is_none() {
            return Err(WorkflowError::UnknownRun(run_id.to_string()));
        }
        Ok(self.log.steps(run_id).await?)
    }

    /// One bench transaction on counter `dbos-{num}`, outside any workflow.
    pub async fn txn(&self, num: usize) -> Result<BenchResult, StepError> {
        let step = StepDescriptor {
            name: "bench_transaction".to_string(),
            handler: Arc::new(BenchStep::new(num)),
        };
        let input = StepInput {
            run_id: format!("txn-{num}"),
            step_index: 0,
            workflow_input: Value::Null,
            previous_output: None,
        };

        let started = Instant::now();
        let output = self.executor.execute_unrecorded(&step, &input).await?;
        Ok(BenchResult {
            output,
            runtime: started.elapsed().as_nanos() as u64,
        })
    }

    /// A `bench` run of `num` transactions, waited on synchronously.
    pub async fn wf(&self, num: u64) -> Result<BenchResult, WorkflowError> {
        let started = Instant::now();
        let outcome = self
            .trigger(BENCH_WORKFLOW, None, json!({ "num": num }), None)
            .await?;

        if outcome.status != RunStatus::Completed {
            return Err(WorkflowError::Failed {
                error: outcome
                    .error
                    .unwrap_or_else(|| format!("run is still {}", outcome.status)),
                run_id: outcome.run_id,
            });
        }
        Ok(BenchResult {
            output: outcome.output.unwrap_or(Value::Null),
            runtime: started.elapsed().as_nanos() as u64,
        })
    }

    /// Validate and create-if-absent. Nothing is written for a bad request.
    ///
    /// An existing run keeps the input it was created with, and its
    /// definition is resolved from that.
    async fn prepare(
        &self,
        workflow: &str,
        run_id: Option<String>,
        input: Value,
    ) -> Result<(Arc<WorkflowDefinition>, WorkflowRun), WorkflowError> {
        let def = self.registry.resolve(workflow, &input)?;
        let run_id = match run_id {
            Some(id) => {
                validate_run_id(&id)?;
                id
            }
            None => Uuid::new_v4().to_string(),
        };

        let (run, created) = self
            .log
            .create_run(NewRun {
                run_id,
                workflow_name: workflow.to_string(),
                input,
            })
            .await?;

        if run.workflow_name != workflow {
            return Err(WorkflowError::Caller(format!(
                "run {} already exists for workflow '{}'",
                run.run_id, run.workflow_name
            )));
        }
        if created {
            info!(run_id = %run.run_id, workflow = %workflow, "Run created");
            return Ok((def, run));
        }

        debug!(run_id = %run.run_id, status = %run.status, "Run already exists");
        let def = self.registry.resolve(workflow, &run.input)?;
        Ok((def, run))
    }

    fn spawn_run(
        &self,
        def: Arc<WorkflowDefinition>,
        run_id: String,
    ) -> JoinHandle<Result<Value, WorkflowError>> {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let result = orchestrator.run(&def, &run_id).await;
            if matches!(result, Err(WorkflowError::AlreadyRunning(_))) {
                debug!(run_id = %run_id, "Run held by another orchestrator");
                return result;
            }
            if matches!(result, Err(WorkflowError::Store(_))) {
                result.log(format!("orchestrating run {run_id}"))
            } else {
                result.log_warn(format!("orchestrating run {run_id}"))
            }
        })
    }
}

/// Run ids are 1-128 characters of `[A-Za-z0-9._:-]`.
pub fn validate_run_id(run_id: &str) -> Result<(), WorkflowError> {
    if run_id.is_empty() || run_id.len() > MAX_RUN_ID_LEN {
        return Err(WorkflowError::Caller(format!(
            "run id must be 1-{MAX_RUN_ID_LEN} characters"
        )));
    }
    if let Some(bad) = run_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
    {
        return Err(WorkflowError::Caller(format!(
            "run id contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::default_registry;
    use crate::engine::workflow::{StepHandler, WorkflowBuilder};
    use crate::store::{MemoryStore, StoreTx};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> AppConfig {
        AppConfig {
            poll_interval_ms: 5,
            sync_timeout_ms: 5_000,
            bench_steps: 3,
            ..AppConfig::default()
        }
    }

    fn gateway(store: &MemoryStore) -> ExecutionGateway {
        let registry = default_registry(3).unwrap();
        ExecutionGateway::with_store(store.clone(), registry, RetryPolicy::immediate(3), &config())
    }

    /// Sleeps inside its transaction, counting calls.
    #[derive(Clone)]
    struct Slow {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl StepHandler for Slow {
        async fn call(&self, tx: &mut dyn StoreTx, _input: &StepInput) -> Result<Value, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let n = crate::engine::increment_counter(tx, "slow").await?;
            Ok(json!(n))
        }
    }

    fn slow_gateway(store: &MemoryStore, delay: Duration) -> (ExecutionGateway, Slow) {
        let slow = Slow {
            calls: Arc::new(AtomicUsize::new(0)),
            delay,
        };
        let mut registry = WorkflowRegistry::new();
        registry
            .register(WorkflowBuilder::new("slow").step("wait", slow.clone()).build().unwrap())
            .unwrap();
        let gw = ExecutionGateway::with_store(store.clone(), registry, RetryPolicy::immediate(3), &config());
        (gw, slow)
    }

    #[tokio::test]
    async fn test_hello_greets_twice() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let first = gw.trigger("hello", None, json!({}), None).await.unwrap();
        let second = gw.trigger("hello", None, json!({}), None).await.unwrap();

        assert_eq!(first.status, RunStatus::Completed);
        assert_eq!(first.output, Some(json!("Hello, dbos! You have been greeted 1 times.")));
        assert_eq!(second.output, Some(json!("Hello, dbos! You have been greeted 2 times.")));
        assert!(first.runtime_ms.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_distinct_runs_all_count() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let gw = gw.clone();
            handles.push(tokio::spawn(async move {
                gw.trigger("hello", None, json!({}), None).await
            }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.status, RunStatus::Completed);
        }

        assert_eq!(store.counter("dbos").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_same_run_id_executes_once() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gw = gw.clone();
            handles.push(tokio::spawn(async move {
                gw.trigger("hello", Some("fixed-id".to_string()), json!({}), None)
                    .await
            }));
        }
        let mut outputs = Vec::new();
        for handle in handles {
            outputs.push(handle.await.unwrap().unwrap().output);
        }

        assert!(outputs.iter().all(|o| *o == outputs[0]));
        assert_eq!(store.counter("dbos").await.unwrap(), Some(1));

        let replay = gw
            .trigger("hello", Some("fixed-id".to_string()), json!({}), None)
            .await
            .unwrap();
        assert_eq!(replay.output, outputs[0]);
        assert_eq!(store.counter("dbos").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_bench_workflow_returns_last_greeting() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let outcome = gw.trigger("bench", None, json!({}), None).await.unwrap();
        assert_eq!(
            outcome.output,
            Some(json!("Greetings, dbos-2! You have been greeted 1 times."))
        );
        assert_eq!(gw.steps(&outcome.run_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_requests_write_nothing() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let err = gw.trigger("nope", None, json!({}), None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Caller(_)));

        let err = gw
            .trigger("hello", Some("bad id!".to_string()), json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INVALID_INPUT);

        assert!(gw.list(&RunFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_input_rejected_before_orchestration() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        for (workflow, input) in [
            ("hello", json!({"name": 7})),
            ("hello", json!(5)),
            ("hello", json!([1])),
            ("bench", json!({"num": 0})),
            ("bench", json!({"num": "many"})),
        ] {
            let err = gw
                .trigger(workflow, Some("bad-input".to_string()), input.clone(), None)
                .await
                .unwrap_err();
            assert!(matches!(err, WorkflowError::Caller(_)), "{workflow} {input}");
            assert_eq!(err.exit_code(), crate::error::EXIT_INVALID_INPUT);
        }

        assert!(gw.list(&RunFilter::default()).await.unwrap().is_empty());
        assert!(store.steps("bad-input").await.unwrap().is_empty());
        assert_eq!(store.counter("dbos").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bench_run_sized_by_input() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let outcome = gw
            .trigger("bench", Some("b-5".to_string()), json!({"num": 5}), None)
            .await
            .unwrap();
        assert_eq!(
            outcome.output,
            Some(json!("Greetings, dbos-4! You have been greeted 1 times."))
        );
        assert_eq!(gw.steps("b-5").await.unwrap().len(), 5);

        // The stored input decides, not the new one.
        let again = gw
            .trigger("bench", Some("b-5".to_string()), json!({"num": 2}), None)
            .await
            .unwrap();
        assert_eq!(again.output, outcome.output);
        assert_eq!(store.counter("dbos-4").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_wf_runs_bench_workflow() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let result = gw.wf(2).await.unwrap();
        assert_eq!(
            result.output,
            json!("Greetings, dbos-1! You have been greeted 1 times.")
        );
        assert!(store.counter("dbos-2").await.unwrap().is_none());

        let err = gw.wf(0).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Caller(_)));
    }

    #[tokio::test]
    async fn test_run_id_reused_across_workflows_rejected() {
        let store = MemoryStore::new();
        let gw = gateway(&store);
        gw.trigger("hello", Some("shared".to_string()), json!({}), None)
            .await
            .unwrap();

        let err = gw
            .trigger("bench", Some("shared".to_string()), json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Caller(_)));
    }

    #[tokio::test]
    async fn test_poll_missing_run_is_caller_error() {
        let store = MemoryStore::new();
        let gw = gateway(&store);
        let err = gw.poll("missing", Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownRun(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_INVALID_INPUT);
    }

    #[tokio::test]
    async fn test_poll_waits_for_running_run() {
        let store = MemoryStore::new();
        let (gw, _) = slow_gateway(&store, Duration::from_millis(100));

        let accepted = gw.start("slow", None, json!({})).await.unwrap();
        let early = gw.poll(&accepted.run_id, Duration::from_millis(10)).await.unwrap();
        assert!(!early.is_terminal());

        let done = gw
            .poll(&accepted.run_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.output, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_sync_timeout_leaves_run_going() {
        let store = MemoryStore::new();
        let (gw, slow) = slow_gateway(&store, Duration::from_millis(150));

        let outcome = gw
            .trigger("slow", Some("long".to_string()), json!({}), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Running);

        let done = gw.poll("long", Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_and_resume() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        // Created but never started, so the cancel lands immediately.
        store
            .create_run(NewRun {
                run_id: "r-1".to_string(),
                workflow_name: "hello".to_string(),
                input: json!({"name": "ada"}),
            })
            .await
            .unwrap();

        let cancelled = gw.cancel("r-1").await.unwrap();
        assert_eq!(cancelled.status, RunStatus::Cancelled);

        let stored = gw
            .trigger("hello", Some("r-1".to_string()), json!({}), None)
            .await
            .unwrap();
        assert_eq!(stored.status, RunStatus::Cancelled);

        gw.resume("r-1").await.unwrap();
        let done = gw.poll("r-1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.output, Some(json!("Hello, ada! You have been greeted 1 times.")));

        let err = gw.resume("r-1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Caller(_)));
    }

    #[tokio::test]
    async fn test_recover_redrives_unfinished_runs() {
        let store = MemoryStore::new();
        let gw = gateway(&store);
        store
            .create_run(NewRun {
                run_id: "orphan".to_string(),
                workflow_name: "hello".to_string(),
                input: json!({}),
            })
            .await
            .unwrap();

        assert_eq!(gw.recover().await.unwrap(), 1);
        let done = gw.poll("orphan", Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_store_outage_maps_to_unavailable() {
        let store = MemoryStore::new();
        let gw = gateway(&store);
        store.set_log_available(false);

        let err = gw.trigger("hello", None, json!({}), None).await.unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_STORE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_txn_increments_named_counter() {
        let store = MemoryStore::new();
        let gw = gateway(&store);

        let result = gw.txn(7).await.unwrap();
        assert_eq!(
            result.output,
            json!("Greetings, dbos-7! You have been greeted 1 times.")
        );
        assert_eq!(store.counter("dbos-7").await.unwrap(), Some(1));
    }

    #[test]
    fn test_validate_run_id() {
        assert!(validate_run_id("run-1_a.b:c").is_ok());
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("has space").is_err());
        assert!(validate_run_id(&"x".repeat(129)).is_err());
    }
}
