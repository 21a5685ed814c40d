//! Transactional step executor.
//!
//! One call runs one step body inside one store transaction. Either every
//! write of the step, and for workflow steps its commit record, becomes
//! visible at commit or none does.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StepError;
use crate::store::{DataStore, StoreTx};

use super::workflow::{StepDescriptor, StepInput};

#[derive(Clone)]
pub struct StepExecutor {
    store: Arc<dyn DataStore>,
}

impl StepExecutor {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Run one attempt of a workflow step and commit it together with the
    /// step's COMMITTED record.
    ///
    /// The record must already be STARTED. A failed commit surfaces as
    /// [`StepError::StoreUnavailable`] with neither the effect nor the record
    /// applied. The connection goes back to the pool on every path.
    pub async fn execute(
        &self,
        step: &StepDescriptor,
        input: &StepInput,
    ) -> Result<serde_json::Value, StepError> {
        self.run_in_transaction(step, input, true).await
    }

    /// Run `step` in a transaction of its own, outside any workflow run.
    pub async fn execute_unrecorded(
        &self,
        step: &StepDescriptor,
        input: &StepInput,
    ) -> Result<serde_json::Value, StepError> {
        self.run_in_transaction(step, input, false).await
    }

    async fn run_in_transaction(
        &self,
        step: &StepDescriptor,
        input: &StepInput,
        record: bool,
    ) -> Result<serde_json::Value, StepError> {
        let mut tx = self.store.begin().await?;

        let result = match step.handler.call(tx.as_mut(), input).await {
            Ok(output) if record => tx
                .record_commit(&input.run_id, input.step_index, &output)
                .await
                .map(|()| output)
                .map_err(StepError::from),
            other => other,
        };

        match result {
            Ok(output) => {
                tx.commit().await?;
                debug!(
                    run_id = %input.run_id,
                    step_index = input.step_index,
                    step = %step.name,
                    "Step transaction committed"
                );
                Ok(output)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        run_id = %input.run_id,
                        step_index = input.step_index,
                        error = %rollback_err,
                        "Rollback failed; transaction abandoned"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Read-modify-write of one counter inside `tx`. Returns the new count.
pub async fn increment_counter(tx: &mut dyn StoreTx, name: &str) -> Result<i64, StepError> {
    let current = tx.read_counter(name).await?;
    let next = current
        .checked_add(1)
        .ok_or_else(|| StepError::ConstraintViolation(format!("counter {name} overflowed")))?;
    tx.write_counter(name, next).await?;
    Ok(next)
}
