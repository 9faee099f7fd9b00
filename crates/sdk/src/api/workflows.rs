//! Workflow definition endpoints.

use crate::client::StepwiseClient;
use crate::error::StepwiseResult;
use serde::{Deserialize, Serialize};
use stepwise_core::types::{
    ContextMode, RuleType, StepId, WorkflowDefinition, WorkflowId, WorkflowRun,
};

pub struct WorkflowsApi<'a> {
    client: &'a StepwiseClient,
}

impl<'a> WorkflowsApi<'a> {
    pub(crate) fn new(client: &'a StepwiseClient) -> Self {
        Self { client }
    }

    /// All workflows, newest first.
    pub async fn list(&self) -> StepwiseResult<Vec<WorkflowDefinition>> {
        let response: ListWorkflowsResponse = self.client.http.get("/api/workflows").await?;
        Ok(response.workflows)
    }

    pub async fn get(&self, workflow_id: &WorkflowId) -> StepwiseResult<WorkflowDefinition> {
        self.client
            .http
            .get(&format!("/api/workflows/{}", workflow_id))
            .await
    }

    /// Create a workflow with its initial steps; the list may be empty.
    pub async fn create(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        steps: Vec<StepInput>,
    ) -> StepwiseResult<WorkflowDefinition> {
        let request = CreateWorkflowRequest {
            name: name.into(),
            description,
            steps,
        };
        self.client.http.post("/api/workflows", &request).await
    }

    pub async fn update(
        &self,
        workflow_id: &WorkflowId,
        request: &UpdateWorkflowRequest,
    ) -> StepwiseResult<WorkflowDefinition> {
        self.client
            .http
            .patch(&format!("/api/workflows/{}", workflow_id), request)
            .await
    }

    /// Delete a workflow. Runs already started are kept.
    pub async fn delete(&self, workflow_id: &WorkflowId) -> StepwiseResult<()> {
        self.client
            .http
            .delete_no_response(&format!("/api/workflows/{}", workflow_id))
            .await
    }

    /// Insert a step; later steps shift down. Returns the updated workflow.
    pub async fn add_step(
        &self,
        workflow_id: &WorkflowId,
        step: &StepInput,
    ) -> StepwiseResult<WorkflowDefinition> {
        self.client
            .http
            .post(&format!("/api/workflows/{}/steps", workflow_id), step)
            .await
    }

    pub async fn update_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        request: &UpdateStepRequest,
    ) -> StepwiseResult<WorkflowDefinition> {
        self.client
            .http
            .patch(
                &format!("/api/workflows/{}/steps/{}", workflow_id, step_id),
                request,
            )
            .await
    }

    pub async fn delete_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
    ) -> StepwiseResult<WorkflowDefinition> {
        self.client
            .http
            .delete(&format!("/api/workflows/{}/steps/{}", workflow_id, step_id))
            .await
    }

    /// Start a run. The server answers as soon as the run is persisted;
    /// poll [`RunsApi::get`](crate::api::RunsApi::get) for progress.
    pub async fn run(&self, workflow_id: &WorkflowId) -> StepwiseResult<WorkflowRun> {
        self.client
            .http
            .post_empty(&format!("/api/workflows/{}/run", workflow_id))
            .await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ListWorkflowsResponse {
    workflows: Vec<WorkflowDefinition>,
}

#[derive(Debug, Serialize)]
struct CreateWorkflowRequest {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    steps: Vec<StepInput>,
}

/// A step to create. Unset fields take the server defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInput {
    pub name: String,
    pub prompt_template: String,
    pub rule_type: RuleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_mode: Option<ContextMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_judge_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_judge_prompt: Option<String>,
}

impl StepInput {
    pub fn new(
        name: impl Into<String>,
        prompt_template: impl Into<String>,
        rule_type: RuleType,
    ) -> Self {
        Self {
            name: name.into(),
            prompt_template: prompt_template.into(),
            rule_type,
            position: None,
            model: None,
            max_tokens: None,
            temperature: None,
            retry_limit: None,
            context_mode: None,
            rule_value: None,
            llm_judge_enabled: None,
            llm_judge_prompt: None,
        }
    }

    /// 1-based position; the step is appended when unset.
    pub fn position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = Some(retry_limit);
        self
    }

    pub fn context_mode(mut self, context_mode: ContextMode) -> Self {
        self.context_mode = Some(context_mode);
        self
    }

    pub fn rule_value(mut self, value: impl Into<String>) -> Self {
        self.rule_value = Some(value.into());
        self
    }

    /// Enable the LLM judge with the given instructions.
    pub fn judge(mut self, prompt: impl Into<String>) -> Self {
        self.llm_judge_enabled = Some(true);
        self.llm_judge_prompt = Some(prompt.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWorkflowRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial step update; only set fields change. Setting `position` moves the step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStepRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_mode: Option<ContextMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<RuleType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_judge_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_judge_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_input_omits_unset_fields() {
        let step = StepInput::new("parse", "Extract: {{context}}", RuleType::Regex)
            .rule_value(r"\d+")
            .retry_limit(1);

        let json = serde_json::to_value(&step).unwrap();

        assert_eq!(json["rule_type"], "regex");
        assert_eq!(json["rule_value"], r"\d+");
        assert_eq!(json["retry_limit"], 1);
        assert!(json.get("model").is_none());
        assert!(json.get("position").is_none());
    }

    #[test]
    fn test_judge_enables_judge() {
        let step = StepInput::new("review", "{{context}}", RuleType::JsonValid)
            .judge("Is the JSON a list of three items?");

        assert_eq!(step.llm_judge_enabled, Some(true));
        assert!(step.llm_judge_prompt.is_some());
    }

    #[test]
    fn test_update_step_request_is_sparse() {
        let request = UpdateStepRequest {
            position: Some(1),
            ..Default::default()
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "position": 1 }));
    }
}
