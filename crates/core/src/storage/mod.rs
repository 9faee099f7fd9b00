pub mod index;

pub use index::RedbStore;

use crate::types::{
    LlmCallLog, RunDetail, RunId, RunStatus, StepRun, StepRunId, WorkflowDefinition, WorkflowId,
    WorkflowRun,
};
use anyhow::Result;

/// Workflow definitions. The engine only reads from it; the server owns writes.
pub trait DefinitionStore: Send + Sync {
    fn store_workflow(&self, workflow: &WorkflowDefinition) -> Result<()>;

    fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>>;

    /// Newest first
    fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>>;

    /// Returns whether a workflow was removed
    fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<bool>;
}

/// Runs, their attempts and LLM call logs
pub trait ExecutionStore: Send + Sync {
    /// Write the pending run together with the definition it will execute.
    fn create_run(&self, run: &WorkflowRun, snapshot: &WorkflowDefinition) -> Result<()>;

    fn get_run(&self, run_id: &RunId) -> Result<Option<WorkflowRun>>;

    fn get_run_snapshot(&self, run_id: &RunId) -> Result<Option<WorkflowDefinition>>;

    /// Move a run to `status`, stamping its timestamps. Transitions the run
    /// state machine does not allow are rejected.
    fn transition_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        failure_reason: Option<String>,
    ) -> Result<WorkflowRun>;

    /// Persist one attempt and its call logs atomically. Rejected unless the
    /// run is `running`.
    fn record_attempt(&self, step_run: &StepRun, logs: &[LlmCallLog]) -> Result<()>;

    /// Attempts ordered by position, then attempt number
    fn list_step_runs(&self, run_id: &RunId) -> Result<Vec<StepRun>>;

    /// Call logs in creation order
    fn get_logs(&self, run_id: &RunId) -> Result<Vec<LlmCallLog>>;

    fn get_step_run_logs(&self, run_id: &RunId, step_run_id: &StepRunId) -> Result<Vec<LlmCallLog>>;

    /// Newest first
    fn list_runs(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowRun>>;

    fn get_run_detail(&self, run_id: &RunId) -> Result<Option<RunDetail>> {
        let Some(run) = self.get_run(run_id)? else {
            return Ok(None);
        };
        let step_runs = self.list_step_runs(run_id)?;
        Ok(Some(RunDetail { run, step_runs }))
    }
}
