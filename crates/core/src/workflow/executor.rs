use super::step_executor::StepExecutor;
use crate::error::{EngineError, EngineResult};
use crate::storage::ExecutionStore;
use crate::types::{RunId, RunStatus, StepDefinition, WorkflowRun};
use std::sync::Arc;

enum StepOutcome {
    /// Context for the next step
    Passed(String),
    Exhausted(String),
    Infrastructure { attempt: u32, error: String },
}

/// Drives one run from `pending` to a terminal state
///
/// Holds no per-run state: everything it needs is read from the execution
/// store, so one executor can drive any number of runs concurrently.
pub struct WorkflowExecutor {
    store: Arc<dyn ExecutionStore>,
    step_executor: Arc<StepExecutor>,
}

impl WorkflowExecutor {
    pub fn new(store: Arc<dyn ExecutionStore>, step_executor: Arc<StepExecutor>) -> Self {
        Self {
            store,
            step_executor,
        }
    }

    /// Execute a pending run to completion and return its final state.
    ///
    /// Runs that are not pending are returned untouched.
    pub async fn execute(&self, run_id: RunId) -> EngineResult<WorkflowRun> {
        let run = self
            .store
            .get_run(&run_id)?
            .ok_or_else(|| EngineError::not_found("run", run_id))?;
        if run.status != RunStatus::Pending {
            tracing::warn!(run_id = %run_id, status = %run.status, "Run is not pending, skipping");
            return Ok(run);
        }

        self.store.transition_run(&run_id, RunStatus::Running, None)?;

        let Some(snapshot) = self.store.get_run_snapshot(&run_id)? else {
            return self.fail(run_id, format!("run {} has no workflow snapshot", run_id));
        };
        let steps = snapshot.ordered_steps();
        tracing::info!(run_id = %run_id, workflow = %snapshot.name, steps = steps.len(), "Starting workflow run");

        let mut context = String::new();
        for step in &steps {
            // Re-read at each step boundary; stop if someone else finished the run
            let current = self
                .store
                .get_run(&run_id)?
                .ok_or_else(|| EngineError::not_found("run", run_id))?;
            if current.status != RunStatus::Running {
                tracing::warn!(run_id = %run_id, status = %current.status, "Run left running state, stopping");
                return Ok(current);
            }

            match self.run_step(run_id, step, &context).await {
                StepOutcome::Passed(next_context) => context = next_context,
                StepOutcome::Exhausted(reason) => {
                    return self.fail(
                        run_id,
                        format!("step {} exhausted retry budget: {}", step.name, reason),
                    );
                }
                StepOutcome::Infrastructure { attempt, error } => {
                    return self.fail(
                        run_id,
                        format!(
                            "infrastructure error in step {} (attempt {}): {}",
                            step.name, attempt, error
                        ),
                    );
                }
            }
        }

        let run = self.store.transition_run(&run_id, RunStatus::Completed, None)?;
        tracing::info!(run_id = %run_id, "Workflow run completed");
        Ok(run)
    }

    /// Bounded retry loop for one step
    async fn run_step(&self, run_id: RunId, step: &StepDefinition, context: &str) -> StepOutcome {
        let mut last_failure: Option<String> = None;

        for attempt in 1..=step.max_attempts() {
            match self
                .step_executor
                .attempt(run_id, step, context, attempt, last_failure.as_deref())
                .await
            {
                Ok(result) if result.success => {
                    return StepOutcome::Passed(result.extracted_context.unwrap_or_default());
                }
                Ok(result) => last_failure = result.failure_reason,
                Err(EngineError::Infrastructure(error)) => {
                    return StepOutcome::Infrastructure { attempt, error };
                }
                Err(other) => {
                    return StepOutcome::Infrastructure {
                        attempt,
                        error: other.to_string(),
                    };
                }
            }
        }

        StepOutcome::Exhausted(last_failure.unwrap_or_else(|| "no attempt passed".to_string()))
    }

    fn fail(&self, run_id: RunId, reason: String) -> EngineResult<WorkflowRun> {
        tracing::error!(run_id = %run_id, reason = %reason, "Workflow run failed");
        Ok(self
            .store
            .transition_run(&run_id, RunStatus::Failed, Some(reason))?)
    }
}
