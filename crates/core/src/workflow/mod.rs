pub mod context;
pub mod engine;
pub mod evaluation;
pub mod executor;
pub mod prompt;
pub mod step_executor;
pub mod validation;

pub use context::ContextTransformer;
pub use engine::WorkflowEngine;
pub use evaluation::{CompletionEvaluator, JudgeInvoker, Rule};
pub use executor::WorkflowExecutor;
pub use step_executor::{AttemptResult, StepExecutor};
pub use validation::validate_workflow;
