//! Workflow definitions.
//!
//! A definition is an ordered list of named steps. Step names are part of
//! the durable log, so a definition must keep its step order and names as
//! long as runs recorded against it may be replayed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StepError, WorkflowError};
use crate::store::StoreTx;

/// What a step sees when it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInput {
    pub run_id: String,
    pub step_index: i32,
    /// Input the run was triggered with.
    pub workflow_input: Value,
    /// Output of the preceding step, `None` for the first step.
    pub previous_output: Option<Value>,
}

/// Body of a transactional step.
///
/// All data access goes through `tx`; the executor commits it when `call`
/// returns `Ok` and rolls it back otherwise.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn call(
        &self,
        tx: &mut dyn StoreTx,
        input: &StepInput,
    ) -> Result<Value, StepError>;
}

/// A named step in a workflow definition.
#[derive(Clone)]
pub struct StepDescriptor {
    pub name: String,
    pub handler: Arc<dyn StepHandler>,
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Checks a run's input before anything is written for it.
pub type InputValidator = fn(&Value) -> Result<(), String>;

/// Ordered, immutable list of steps.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    steps: Vec<StepDescriptor>,
    validator: Option<InputValidator>,
}

impl WorkflowDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Reject input the steps could not run with.
    pub fn validate_input(&self, input: &Value) -> Result<(), WorkflowError> {
        match self.validator {
            Some(validate) => validate(input).map_err(|reason| {
                WorkflowError::Caller(format!("invalid input for workflow '{}': {reason}", self.name))
            }),
            None => Ok(()),
        }
    }
}

/// Builder for [`WorkflowDefinition`].
pub struct WorkflowBuilder {
    name: String,
    steps: Vec<StepDescriptor>,
    validator: Option<InputValidator>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            validator: None,
        }
    }

    /// Append a step.
    pub fn step(mut self, name: impl Into<String>, handler: impl StepHandler + 'static) -> Self {
        self.steps.push(StepDescriptor {
            name: name.into(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn validate_input(mut self, validator: InputValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition, WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Caller(
                "workflow name must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::Caller(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }
        if let Some(idx) = self.steps.iter().position(|s| s.name.trim().is_empty()) {
            return Err(WorkflowError::Caller(format!(
                "workflow '{}' step {} has an empty name",
                self.name, idx
            )));
        }

        Ok(WorkflowDefinition {
            name: self.name,
            steps: self.steps,
            validator: self.validator,
        })
    }
}

/// Source of the definition a run executes.
///
/// Most workflows have one fixed definition. A factory can instead shape
/// the steps from the run input; it must return the same definition for the
/// same input, since recovery resolves it again from the stored input.
pub trait WorkflowFactory: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, input: &Value) -> Result<Arc<WorkflowDefinition>, WorkflowError>;
}

struct FixedWorkflow(Arc<WorkflowDefinition>);

impl WorkflowFactory for FixedWorkflow {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn resolve(&self, _input: &Value) -> Result<Arc<WorkflowDefinition>, WorkflowError> {
        Ok(self.0.clone())
    }
}

/// Known workflows, keyed by name.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<dyn WorkflowFactory>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<(), WorkflowError> {
        self.register_factory(Arc::new(FixedWorkflow(Arc::new(definition))))
    }

    pub fn register_factory(&mut self, factory: Arc<dyn WorkflowFactory>) -> Result<(), WorkflowError> {
        if self.workflows.contains_key(factory.name()) {
            return Err(WorkflowError::Caller(format!(
                "workflow '{}' is already registered",
                factory.name()
            )));
        }
        self.workflows.insert(factory.name().to_string(), factory);
        Ok(())
    }

    /// Definition for a run of `name` with `input`, after validating the
    /// input. Unknown workflows and invalid input are caller errors.
    pub fn resolve(&self, name: &str, input: &Value) -> Result<Arc<WorkflowDefinition>, WorkflowError> {
        let factory = self
            .workflows
            .get(name)
            .ok_or_else(|| WorkflowError::Caller(format!("unknown workflow '{name}'")))?;
        let definition = factory.resolve(input)?;
        definition.validate_input(input)?;
        Ok(definition)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl StepHandler for Echo {
        async fn call(
            &self,
            _tx: &mut dyn StoreTx,
            input: &StepInput,
        ) -> Result<serde_json::Value, StepError> {
            Ok(json!(input.step_index))
        }
    }

    #[test]
    fn test_build_keeps_step_order() {
        let def = WorkflowBuilder::new("pipeline")
            .step("extract", Echo)
            .step("load", Echo)
            .build()
            .unwrap();
        assert_eq!(def.name(), "pipeline");
        let names: Vec<&str> = def.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["extract", "load"]);
    }

    #[test]
    fn test_build_rejects_invalid_definitions() {
        assert!(WorkflowBuilder::new("").step("a", Echo).build().is_err());
        assert!(WorkflowBuilder::new("empty").build().is_err());
        assert!(WorkflowBuilder::new("w").step(" ", Echo).build().is_err());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = WorkflowRegistry::new();
        let def = || WorkflowBuilder::new("w").step("a", Echo).build().unwrap();
        registry.register(def()).unwrap();
        assert!(registry.register(def()).is_err());
        assert!(registry.resolve("w", &json!({})).is_ok());
        assert!(matches!(
            registry.resolve("x", &json!({})),
            Err(WorkflowError::Caller(_))
        ));
        assert_eq!(registry.names(), vec!["w"]);
    }

    #[test]
    fn test_resolve_validates_input() {
        fn object_only(input: &Value) -> Result<(), String> {
            if input.is_object() {
                Ok(())
            } else {
                Err("expected an object".to_string())
            }
        }

        let mut registry = WorkflowRegistry::new();
        registry
            .register(
                WorkflowBuilder::new("w")
                    .step("a", Echo)
                    .validate_input(object_only)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(registry.resolve("w", &json!({"k": 1})).is_ok());
        let err = registry.resolve("w", &json!([1])).unwrap_err();
        assert!(err.to_string().contains("expected an object"));
        assert_eq!(err.exit_code(), crate::error::EXIT_INVALID_INPUT);
    }
}
