//! Workflow orchestrator.
//!
//! Drives one run through its definition:
//! - takes the run's exclusive claim and renews it at every step boundary,
//!   and in the background while a step executes
//! - replays committed steps from the log without executing them
//! - executes the rest through the [`StepExecutor`], retrying transient failures
//! - writes the terminal outcome and releases the claim

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::models::{RunCompletion, RunStatus, StepRecord, WorkflowRun};
use crate::error::{StepError, StoreError, WorkflowError};
use crate::store::ExecutionLog;

use super::executor::StepExecutor;
use super::retry::RetryPolicy;
use super::workflow::{StepDescriptor, StepInput, WorkflowDefinition};

/// Runs workflows against the execution log.
///
/// Every call to [`Orchestrator::run`] claims under its own owner id
/// (`{owner_prefix}:{uuid}`), so two invocations in one process exclude
/// each other just like two processes do.
#[derive(Clone)]
pub struct Orchestrator {
    log: Arc<dyn ExecutionLog>,
    executor: StepExecutor,
    retry: RetryPolicy,
    owner_prefix: String,
    claim_ttl: Duration,
}

impl Orchestrator {
    pub fn new(
        log: Arc<dyn ExecutionLog>,
        executor: StepExecutor,
        retry: RetryPolicy,
        owner_prefix: impl Into<String>,
        claim_ttl: Duration,
    ) -> Self {
        Self {
            log,
            executor,
            retry,
            owner_prefix: owner_prefix.into(),
            claim_ttl,
        }
    }

    /// Drive `run_id` to a terminal state and return its output.
    ///
    /// A run that is already terminal returns its stored outcome without
    /// executing anything.
    pub async fn run(&self, def: &WorkflowDefinition, run_id: &str) -> Result<Value, WorkflowError> {
        let run = self
            .log
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::UnknownRun(run_id.to_string()))?;

        if run.workflow_name != def.name() {
            return Err(WorkflowError::Caller(format!(
                "run {} belongs to workflow '{}', not '{}'",
                run_id,
                run.workflow_name,
                def.name()
            )));
        }
        if run.status.is_terminal() {
            debug!(run_id = %run_id, status = %run.status, "Run already terminal; returning stored outcome");
            return stored_outcome(run);
        }

        let owner = format!("{}:{}", self.owner_prefix, Uuid::new_v4().simple());
        let Some(claimed) = self.log.claim_run(run_id, &owner, self.claim_ttl).await? else {
            // Lost the race: either it is finished now or someone else holds it.
            return match self.log.get_run(run_id).await? {
                Some(run) if run.status.is_terminal() => stored_outcome(run),
                _ => Err(WorkflowError::AlreadyRunning(run_id.to_string())),
            };
        };

        info!(run_id = %run_id, workflow = %def.name(), owner = %owner, "Run claimed");

        let result = self.drive(def, claimed, &owner).await;
        self.finish(run_id, &owner, result).await
    }

    async fn drive(
        &self,
        def: &WorkflowDefinition,
        mut run: WorkflowRun,
        owner: &str,
    ) -> Result<Value, WorkflowError> {
        let run_id = run.run_id.clone();
        let step_count = i32::try_from(def.steps().len())
            .map_err(|_| WorkflowError::Caller(format!("workflow '{}' has too many steps", def.name())))?;

        if let Some(extra) = self.lookup(&run_id, step_count).await? {
            if extra.is_committed() {
                return Err(WorkflowError::ReplayInconsistency {
                    run_id,
                    step_index: step_count,
                    message: format!(
                        "log holds committed step '{}' beyond the {} steps of '{}'",
                        extra.step_name,
                        step_count,
                        def.name()
                    ),
                });
            }
        }

        let mut previous_output: Option<Value> = None;

        for (position, step) in def.steps().iter().enumerate() {
            let step_index = position as i32;

            if step_index > 0 {
                run = self
                    .log
                    .claim_run(&run_id, owner, self.claim_ttl)
                    .await?
                    .ok_or_else(|| WorkflowError::AlreadyRunning(run_id.clone()))?;
            }
            if run.cancel_requested {
                info!(run_id = %run_id, step_index, "Cancel requested; stopping before step");
                return Err(WorkflowError::Cancelled(run_id));
            }

            if let Some(record) = self.lookup(&run_id, step_index).await? {
                if record.step_name != step.name {
                    return Err(WorkflowError::ReplayInconsistency {
                        run_id,
                        step_index,
                        message: format!(
                            "log records step '{}' where the definition has '{}'",
                            record.step_name, step.name
                        ),
                    });
                }
                if record.is_committed() {
                    debug!(run_id = %run_id, step_index, step = %step.name, "Replaying committed step");
                    previous_output = Some(record.output.unwrap_or(Value::Null));
                    continue;
                }
                debug!(
                    run_id = %run_id,
                    step_index,
                    attempts = record.attempts,
                    "Step was in flight; re-attempting"
                );
            }

            let input = StepInput {
                run_id: run_id.clone(),
                step_index,
                workflow_input: run.input.clone(),
                previous_output: previous_output.take(),
            };
            previous_output = Some(self.execute_step(step, input, owner).await?);
        }

        Ok(previous_output.unwrap_or(Value::Null))
    }

    /// Execute one step until it commits, fails fatally, or runs out of attempts.
    ///
    /// The executor writes the COMMITTED record in the step's transaction, so
    /// a successful `execute` is the commit.
    async fn execute_step(
        &self,
        step: &StepDescriptor,
        input: StepInput,
        owner: &str,
    ) -> Result<Value, WorkflowError> {
        let run_id = input.run_id.as_str();
        let step_index = input.step_index;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.log.record_start(run_id, step_index, &step.name).await?;

            let keeper = self.keep_claim(run_id, owner);
            let result = self.executor.execute(step, &input).await;
            drop(keeper);

            let err = match result {
                Ok(output) => {
                    debug!(run_id = %run_id, step_index, attempt, "Step committed");
                    return Ok(output);
                }
                Err(err) => err,
            };

            // A previous owner whose claim lapsed may have committed it first.
            if let Some(record) = self.lookup(run_id, step_index).await? {
                if record.is_committed() {
                    debug!(run_id = %run_id, step_index, "Step committed by another owner; reusing output");
                    return Ok(record.output.unwrap_or(Value::Null));
                }
            }

            if err.is_retryable() && self.retry.should_retry(attempt) {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    run_id = %run_id,
                    step_index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient step failure; retrying"
                );
                self.log.record_failure(run_id, step_index, &err.to_string()).await?;
                tokio::time::sleep(delay).await;
                self.log
                    .claim_run(run_id, owner, self.claim_ttl)
                    .await?
                    .ok_or_else(|| WorkflowError::AlreadyRunning(run_id.to_string()))?;
                continue;
            }

            self.log.record_failure(run_id, step_index, &err.to_string()).await?;
            return Err(step_failure(&step.name, attempt, err));
        }
    }

    /// Renew the claim every third of its TTL until the keeper is dropped.
    fn keep_claim(&self, run_id: &str, owner: &str) -> Option<ClaimKeeper> {
        let period = self.claim_ttl / 3;
        if period.is_zero() {
            return None;
        }
        let log = self.log.clone();
        let ttl = self.claim_ttl;
        let run_id = run_id.to_string();
        let owner = owner.to_string();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                match log.claim_run(&run_id, &owner, ttl).await {
                    Ok(Some(_)) => debug!(run_id = %run_id, "Claim renewed during step"),
                    Ok(None) => {
                        warn!(run_id = %run_id, owner = %owner, "Claim lost while a step was executing");
                        return;
                    }
                    Err(err) => warn!(run_id = %run_id, error = %err, "Claim renewal failed"),
                }
            }
        });
        Some(ClaimKeeper(handle))
    }

    /// Step record lookup. A record that cannot be decoded is corruption of
    /// the run's history, not a store outage.
    async fn lookup(&self, run_id: &str, step_index: i32) -> Result<Option<StepRecord>, WorkflowError> {
        match self.log.lookup(run_id, step_index).await {
            Ok(record) => Ok(record),
            Err(StoreError::Corrupt(message)) => Err(WorkflowError::ReplayInconsistency {
                run_id: run_id.to_string(),
                step_index,
                message,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist the terminal outcome of a claimed run.
    async fn finish(
        &self,
        run_id: &str,
        owner: &str,
        result: Result<Value, WorkflowError>,
    ) -> Result<Value, WorkflowError> {
        let completion = match &result {
            Ok(output) => RunCompletion::Completed(output.clone()),
            Err(WorkflowError::Cancelled(_)) => RunCompletion::Cancelled,
            Err(
                err @ (WorkflowError::TransientStore { .. }
                | WorkflowError::Constraint { .. }
                | WorkflowError::ReplayInconsistency { .. }),
            ) => RunCompletion::Failed(err.to_string()),
            Err(WorkflowError::AlreadyRunning(_)) => {
                warn!(run_id = %run_id, "Claim lost mid-run; leaving run to its new owner");
                return result;
            }
            Err(err) => {
                // The log itself failed; the claim lapses and recovery re-drives the run.
                warn!(run_id = %run_id, error = %err, "Run interrupted by execution log failure");
                if let Err(release_err) = self.log.release_run(run_id, owner).await {
                    debug!(run_id = %run_id, error = %release_err, "Claim release failed");
                }
                return result;
            }
        };

        let status = completion.status();
        match self.log.finish_run(run_id, owner, completion).await? {
            Some(_) if status == RunStatus::Completed => {
                info!(run_id = %run_id, status = %status, "Run finished");
                result
            }
            Some(_) => {
                warn!(run_id = %run_id, status = %status, "Run finished without completing");
                result
            }
            None => Err(WorkflowError::AlreadyRunning(run_id.to_string())),
        }
    }
}

/// Background claim renewal, stopped on drop.
struct ClaimKeeper(tokio::task::JoinHandle<()>);

impl Drop for ClaimKeeper {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn step_failure(step: &str, attempts: u32, err: StepError) -> WorkflowError {
    match err {
        StepError::StoreUnavailable(message) => WorkflowError::TransientStore {
            step: step.to_string(),
            attempts,
            message,
        },
        StepError::ConstraintViolation(message) | StepError::InvalidInput(message) => {
            WorkflowError::Constraint {
                step: step.to_string(),
                message,
            }
        }
    }
}

/// Outcome of a run that is already terminal.
pub(crate) fn stored_outcome(run: WorkflowRun) -> Result<Value, WorkflowError> {
    match run.status {
        RunStatus::Completed => Ok(run.output.unwrap_or(Value::Null)),
        RunStatus::Cancelled => Err(WorkflowError::Cancelled(run.run_id)),
        _ => Err(WorkflowError::Failed {
            error: run.error.unwrap_or_else(|| "unknown error".to_string()),
            run_id: run.run_id,
        }),
    }
}
