//! Boundary consumed by the HTTP layer: start runs and read them back.

use super::executor::WorkflowExecutor;
use super::step_executor::StepExecutor;
use super::validation::validate_workflow;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::llm::LlmClient;
use crate::storage::{DefinitionStore, ExecutionStore};
use crate::types::{
    LlmCallLog, RunDetail, RunId, RunStatus, StepRunId, WorkflowId, WorkflowRun,
};
use std::sync::Arc;

pub struct WorkflowEngine {
    definitions: Arc<dyn DefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
    executor: Arc<WorkflowExecutor>,
}

impl WorkflowEngine {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        llm: Arc<dyn LlmClient>,
        config: &EngineConfig,
    ) -> Self {
        let step_executor = Arc::new(StepExecutor::new(llm, executions.clone(), config));
        let executor = Arc::new(WorkflowExecutor::new(executions.clone(), step_executor));

        Self {
            definitions,
            executions,
            executor,
        }
    }

    /// Validate the workflow and persist a pending run with a snapshot of it.
    ///
    /// Nothing is written when validation fails.
    pub fn create_run(&self, workflow_id: &WorkflowId) -> EngineResult<WorkflowRun> {
        let workflow = self
            .definitions
            .get_workflow(workflow_id)?
            .ok_or_else(|| EngineError::not_found("workflow", workflow_id))?;

        validate_workflow(&workflow)?;

        let run = WorkflowRun::pending(workflow.id);
        self.executions.create_run(&run, &workflow)?;
        tracing::info!(run_id = %run.id, workflow_id = %workflow.id, "Created workflow run");
        Ok(run)
    }

    /// Create a run and execute it in the background. Returns the pending run
    /// as soon as it is persisted.
    pub fn start_run(&self, workflow_id: &WorkflowId) -> EngineResult<WorkflowRun> {
        let run = self.create_run(workflow_id)?;
        let run_id = run.id;

        let executor = self.executor.clone();
        let executions = self.executions.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.execute(run_id).await {
                tracing::error!(run_id = %run_id, error = %e, "Workflow run aborted");
                abandon_run(executions.as_ref(), &run_id, format!("infrastructure error: {}", e));
            }
        });

        Ok(run)
    }

    /// Execute an already created run on the current task.
    pub async fn execute_run(&self, run_id: RunId) -> EngineResult<WorkflowRun> {
        self.executor.execute(run_id).await
    }

    /// Run status with its attempts; safe to poll.
    pub fn get_run(&self, run_id: &RunId) -> EngineResult<RunDetail> {
        self.executions
            .get_run_detail(run_id)?
            .ok_or_else(|| EngineError::not_found("run", run_id))
    }

    /// Call logs of a run in creation order
    pub fn get_logs(&self, run_id: &RunId) -> EngineResult<Vec<LlmCallLog>> {
        self.ensure_run(run_id)?;
        Ok(self.executions.get_logs(run_id)?)
    }

    pub fn get_step_run_logs(
        &self,
        run_id: &RunId,
        step_run_id: &StepRunId,
    ) -> EngineResult<Vec<LlmCallLog>> {
        self.ensure_run(run_id)?;
        Ok(self.executions.get_step_run_logs(run_id, step_run_id)?)
    }

    pub fn list_runs(&self, workflow_id: &WorkflowId) -> EngineResult<Vec<WorkflowRun>> {
        Ok(self.executions.list_runs(workflow_id)?)
    }

    fn ensure_run(&self, run_id: &RunId) -> EngineResult<()> {
        match self.executions.get_run(run_id)? {
            Some(_) => Ok(()),
            None => Err(EngineError::not_found("run", run_id)),
        }
    }
}

/// Move a run that stopped on an error to `failed`, passing through
/// `running` when it never got that far. Terminal runs are left as they are.
fn abandon_run(executions: &dyn ExecutionStore, run_id: &RunId, reason: String) {
    let run = match executions.get_run(run_id) {
        Ok(Some(run)) => run,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "Failed to load aborted run");
            return;
        }
    };
    if run.status.is_terminal() {
        return;
    }

    if run.status == RunStatus::Pending {
        if let Err(e) = executions.transition_run(run_id, RunStatus::Running, None) {
            tracing::error!(run_id = %run_id, error = %e, "Failed to mark run as failed");
            return;
        }
    }
    if let Err(e) = executions.transition_run(run_id, RunStatus::Failed, Some(reason)) {
        tracing::error!(run_id = %run_id, error = %e, "Failed to mark run as failed");
    }
}
