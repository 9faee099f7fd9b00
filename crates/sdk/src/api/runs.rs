//! Workflow run endpoints.

use crate::client::StepwiseClient;
use crate::error::StepwiseResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stepwise_core::types::{LlmCallLog, RunDetail, RunId, StepRunId, WorkflowId, WorkflowRun};

pub struct RunsApi<'a> {
    client: &'a StepwiseClient,
}

impl<'a> RunsApi<'a> {
    pub(crate) fn new(client: &'a StepwiseClient) -> Self {
        Self { client }
    }

    /// Run status with every attempt made so far.
    pub async fn get(&self, run_id: &RunId) -> StepwiseResult<RunDetail> {
        self.client.http.get(&format!("/api/runs/{}", run_id)).await
    }

    /// Runs of one workflow, newest first.
    pub async fn list_for_workflow(&self, workflow_id: &WorkflowId) -> StepwiseResult<Vec<WorkflowRun>> {
        let response: ListRunsResponse = self
            .client
            .http
            .get(&format!("/api/workflows/{}/runs", workflow_id))
            .await?;
        Ok(response.runs)
    }

    /// Every LLM call made by the run, in the order they happened.
    pub async fn logs(&self, run_id: &RunId) -> StepwiseResult<Vec<LlmCallLog>> {
        let response: GetLogsResponse = self
            .client
            .http
            .get(&format!("/api/runs/{}/logs", run_id))
            .await?;
        Ok(response.logs)
    }

    /// LLM calls of one step attempt: the main or retry call, then the judge call if any.
    pub async fn step_logs(
        &self,
        run_id: &RunId,
        step_run_id: &StepRunId,
    ) -> StepwiseResult<Vec<LlmCallLog>> {
        let response: GetLogsResponse = self
            .client
            .http
            .get(&format!("/api/runs/{}/steps/{}/logs", run_id, step_run_id))
            .await?;
        Ok(response.logs)
    }

    /// Poll until the run reaches `completed` or `failed`.
    pub async fn wait(&self, run_id: &RunId, poll_interval: Duration) -> StepwiseResult<RunDetail> {
        loop {
            let detail = self.get(run_id).await?;
            if detail.run.status.is_terminal() {
                return Ok(detail);
            }
            tracing::debug!(run_id = %run_id, status = %detail.run.status, "Run still in progress");
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ListRunsResponse {
    runs: Vec<WorkflowRun>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetLogsResponse {
    logs: Vec<LlmCallLog>,
}
