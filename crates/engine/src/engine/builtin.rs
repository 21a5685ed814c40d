//! Built-in workflows: the `hello` greeter and the `bench` step chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{StepError, WorkflowError};
use crate::store::StoreTx;

use super::executor::increment_counter;
use super::workflow::{
    StepHandler, StepInput, WorkflowBuilder, WorkflowDefinition, WorkflowFactory, WorkflowRegistry,
};

pub const HELLO_WORKFLOW: &str = "hello";
pub const BENCH_WORKFLOW: &str = "bench";

/// Upper bound on the `num` a bench run may ask for.
pub const MAX_BENCH_STEPS: usize = 1_000;

const DEFAULT_USER: &str = "dbos";

fn as_object(input: &Value) -> Result<&serde_json::Map<String, Value>, String> {
    input
        .as_object()
        .ok_or_else(|| format!("input must be a JSON object, got {input}"))
}

/// The user to greet: `input.name`, or `dbos` when absent or null.
fn greet_name(input: &Value) -> Result<&str, String> {
    match as_object(input)?.get("name") {
        None | Some(Value::Null) => Ok(DEFAULT_USER),
        Some(Value::String(name)) if !name.is_empty() => Ok(name.as_str()),
        Some(other) => Err(format!("'name' must be a non-empty string, got {other}")),
    }
}

/// Number of bench steps: `input.num`, or `default` when absent or null.
fn bench_steps(input: &Value, default: usize) -> Result<usize, String> {
    let num = match as_object(input)?.get("num") {
        None | Some(Value::Null) => return Ok(default),
        Some(value) => value.as_u64().and_then(|n| usize::try_from(n).ok()),
    };
    match num {
        Some(n) if (1..=MAX_BENCH_STEPS).contains(&n) => Ok(n),
        _ => Err(format!(
            "'num' must be an integer from 1 to {MAX_BENCH_STEPS}, got {}",
            input["num"]
        )),
    }
}

/// Increments the counter named by `input.name` and greets that user.
pub struct GreetStep;

#[async_trait]
impl StepHandler for GreetStep {
    async fn call(&self, tx: &mut dyn StoreTx, input: &StepInput) -> Result<Value, StepError> {
        let name = greet_name(&input.workflow_input).map_err(StepError::InvalidInput)?;

        let count = increment_counter(tx, name).await?;
        let greeting = format!("Hello, {name}! You have been greeted {count} times.");
        debug!(run_id = %input.run_id, "{}", greeting);
        Ok(json!(greeting))
    }
}

/// Increments counter `dbos-{index}`.
pub struct BenchStep {
    index: usize,
}

impl BenchStep {
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    pub fn counter_name(&self) -> String {
        format!("dbos-{}", self.index)
    }
}

#[async_trait]
impl StepHandler for BenchStep {
    async fn call(&self, tx: &mut dyn StoreTx, _input: &StepInput) -> Result<Value, StepError> {
        let name = self.counter_name();
        let count = increment_counter(tx, &name).await?;
        Ok(json!(format!("Greetings, {name}! You have been greeted {count} times.")))
    }
}

pub fn hello_workflow() -> Result<WorkflowDefinition, WorkflowError> {
    WorkflowBuilder::new(HELLO_WORKFLOW)
        .step("hello_transaction", GreetStep)
        .validate_input(|input| greet_name(input).map(|_| ()))
        .build()
}

/// `steps` sequential transactions; the output is the last greeting.
pub fn bench_workflow(steps: usize) -> Result<WorkflowDefinition, WorkflowError> {
    (0..steps)
        .fold(WorkflowBuilder::new(BENCH_WORKFLOW), |builder, i| {
            builder.step("bench_transaction", BenchStep::new(i))
        })
        .build()
}

/// The `bench` workflow, sized per run by `input.num`.
///
/// Definitions are built once per size and shared afterwards.
pub struct BenchWorkflows {
    default_steps: usize,
    built: Mutex<HashMap<usize, Arc<WorkflowDefinition>>>,
}

impl BenchWorkflows {
    pub fn new(default_steps: usize) -> Result<Self, WorkflowError> {
        if !(1..=MAX_BENCH_STEPS).contains(&default_steps) {
            return Err(WorkflowError::Caller(format!(
                "bench step count must be from 1 to {MAX_BENCH_STEPS}, got {default_steps}"
            )));
        }
        Ok(Self {
            default_steps,
            built: Mutex::new(HashMap::new()),
        })
    }
}

impl WorkflowFactory for BenchWorkflows {
    fn name(&self) -> &str {
        BENCH_WORKFLOW
    }

    fn resolve(&self, input: &Value) -> Result<Arc<WorkflowDefinition>, WorkflowError> {
        let steps = bench_steps(input, self.default_steps).map_err(|reason| {
            WorkflowError::Caller(format!("invalid input for workflow '{BENCH_WORKFLOW}': {reason}"))
        })?;

        let mut built = self.built.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(definition) = built.get(&steps) {
            return Ok(definition.clone());
        }
        let definition = Arc::new(bench_workflow(steps)?);
        built.insert(steps, definition.clone());
        Ok(definition)
    }
}

pub fn default_registry(bench_steps: usize) -> Result<WorkflowRegistry, WorkflowError> {
    let mut registry = WorkflowRegistry::new();
    registry.register(hello_workflow()?)?;
    registry.register_factory(Arc::new(BenchWorkflows::new(bench_steps)?))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::executor::StepExecutor;
    use crate::store::{DataStore, MemoryStore};

    fn input(workflow_input: Value) -> StepInput {
        StepInput {
            run_id: "r-1".to_string(),
            step_index: 0,
            workflow_input,
            previous_output: None,
        }
    }

    #[tokio::test]
    async fn test_greet_defaults_to_dbos() {
        let store = MemoryStore::new();
        let executor = StepExecutor::new(Arc::new(store.clone()));
        let def = hello_workflow().unwrap();
        let step = &def.steps()[0];

        let first = executor.execute_unrecorded(step, &input(json!({}))).await.unwrap();
        let second = executor.execute_unrecorded(step, &input(json!({}))).await.unwrap();

        assert_eq!(first, json!("Hello, dbos! You have been greeted 1 times."));
        assert_eq!(second, json!("Hello, dbos! You have been greeted 2 times."));
        assert_eq!(store.counter("dbos").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_greet_rejects_bad_name() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = GreetStep
            .call(tx.as_mut(), &input(json!({"name": 7})))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidInput(_)));
    }

    #[test]
    fn test_hello_input_validation() {
        let def = hello_workflow().unwrap();
        assert!(def.validate_input(&json!({})).is_ok());
        assert!(def.validate_input(&json!({"name": null})).is_ok());
        assert!(def.validate_input(&json!({"name": "ada"})).is_ok());
        for bad in [json!({"name": 7}), json!({"name": ""}), json!(5), json!([1])] {
            let err = def.validate_input(&bad).unwrap_err();
            assert!(matches!(err, WorkflowError::Caller(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_bench_step_greeting() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let output = BenchStep::new(3).call(tx.as_mut(), &input(json!({}))).await.unwrap();
        assert_eq!(output, json!("Greetings, dbos-3! You have been greeted 1 times."));
    }

    #[test]
    fn test_bench_sized_by_input() {
        let registry = default_registry(4).unwrap();
        let steps = |input: Value| registry.resolve(BENCH_WORKFLOW, &input).map(|d| d.steps().len());

        assert_eq!(steps(json!({})).unwrap(), 4);
        assert_eq!(steps(json!({"num": 7})).unwrap(), 7);
        assert_eq!(steps(json!({"num": MAX_BENCH_STEPS})).unwrap(), MAX_BENCH_STEPS);
        for bad in [
            json!({"num": 0}),
            json!({"num": -1}),
            json!({"num": 2.5}),
            json!({"num": "3"}),
            json!({"num": MAX_BENCH_STEPS + 1}),
            json!(3),
        ] {
            assert!(matches!(steps(bad), Err(WorkflowError::Caller(_))));
        }

        let first = registry.resolve(BENCH_WORKFLOW, &json!({"num": 7})).unwrap();
        let again = registry.resolve(BENCH_WORKFLOW, &json!({"num": 7})).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_default_registry() {
        let registry = default_registry(4).unwrap();
        assert_eq!(registry.names(), vec![BENCH_WORKFLOW, HELLO_WORKFLOW]);
        assert!(default_registry(0).is_err());
        assert!(default_registry(MAX_BENCH_STEPS + 1).is_err());
    }
}
