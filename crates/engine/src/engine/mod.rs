//! Workflow execution engine.
//!
//! - **Workflow**: step handlers, definitions and the registry
//! - **Executor**: runs one step inside one store transaction
//! - **Orchestrator**: drives a run through its steps against the execution log
//! - **Retry**: backoff for transient step failures
//! - **Builtin**: the `hello` workflow and the input-sized `bench` workflow

pub mod builtin;
pub mod executor;
pub mod orchestrator;
pub mod retry;
pub mod workflow;

pub use builtin::{default_registry, BenchStep, BenchWorkflows, GreetStep, BENCH_WORKFLOW};
pub use executor::{increment_counter, StepExecutor};
pub use orchestrator::Orchestrator;
pub use retry::RetryPolicy;
pub use workflow::{
    InputValidator, StepDescriptor, StepHandler, StepInput, WorkflowBuilder, WorkflowDefinition,
    WorkflowFactory, WorkflowRegistry,
};
