use super::{ApiResult, RequestError};
use crate::config::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use stepwise_core::{
    ContextMode, EngineError, LlmCallLog, RuleType, RunDetail, RunId, StepDefinition, StepId,
    StepRunId, WorkflowDefinition, WorkflowId, WorkflowRun,
};

fn parse_id<T: FromStr>(kind: &'static str, raw: &str) -> Result<T, RequestError> {
    raw.parse().map_err(|_| RequestError::InvalidId {
        kind,
        value: raw.to_string(),
    })
}

fn load_workflow(state: &AppState, workflow_id: &WorkflowId) -> ApiResult<WorkflowDefinition> {
    Ok(state
        .definitions
        .get_workflow(workflow_id)?
        .ok_or_else(|| EngineError::not_found("workflow", workflow_id))?)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListWorkflowsResponse {
    pub workflows: Vec<WorkflowDefinition>,
}

/// List all workflows
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListWorkflowsResponse>> {
    let workflows = state.definitions.list_workflows()?;
    Ok(Json(ListWorkflowsResponse { workflows }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepInput>,
}

/// Step as submitted by clients; unset fields take the service defaults
#[derive(Debug, Serialize, Deserialize)]
pub struct StepInput {
    pub name: String,
    pub prompt_template: String,
    pub rule_type: RuleType,
    /// 1-based; appended when absent
    pub position: Option<u32>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub retry_limit: Option<u32>,
    pub context_mode: Option<ContextMode>,
    pub rule_value: Option<String>,
    pub llm_judge_enabled: Option<bool>,
    pub llm_judge_prompt: Option<String>,
}

impl StepInput {
    fn into_step(self, default_position: u32) -> StepDefinition {
        let mut step = StepDefinition::new(
            self.position.unwrap_or(default_position),
            self.name,
            self.prompt_template,
            self.rule_type,
        );
        if let Some(model) = self.model {
            step.model = model;
        }
        if let Some(max_tokens) = self.max_tokens {
            step.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            step.temperature = temperature;
        }
        if let Some(retry_limit) = self.retry_limit {
            step.retry_limit = retry_limit;
        }
        if let Some(context_mode) = self.context_mode {
            step.context_mode = context_mode;
        }
        step.rule_value = self.rule_value;
        step.llm_judge_enabled = self.llm_judge_enabled.unwrap_or(false);
        step.llm_judge_prompt = self.llm_judge_prompt;
        step
    }
}

/// Create a workflow, optionally with its steps
pub async fn create_workflow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWorkflowRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    if req.name.trim().is_empty() {
        return Err(RequestError::Invalid("workflow name must not be empty".to_string()).into());
    }

    let mut workflow = WorkflowDefinition::new(req.name, req.description);
    for input in req.steps {
        let next = workflow.steps.len() as u32 + 1;
        workflow.insert_step(input.into_step(next));
    }

    state.definitions.store_workflow(&workflow)?;
    tracing::info!("Created workflow: {} ({})", workflow.name, workflow.id);

    Ok((StatusCode::CREATED, Json(workflow)))
}

/// Get a specific workflow
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;
    Ok(Json(load_workflow(&state, &workflow_id)?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateWorkflowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(req): Json<UpdateWorkflowRequest>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;
    let _guard = state.edit_lock.lock().await;

    let mut workflow = load_workflow(&state, &workflow_id)?;
    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(RequestError::Invalid("workflow name must not be empty".to_string()).into());
        }
        workflow.name = name;
    }
    if req.description.is_some() {
        workflow.description = req.description;
    }
    workflow.touch();

    state.definitions.store_workflow(&workflow)?;
    Ok(Json(workflow))
}

/// Delete a workflow; runs already started keep their snapshot
pub async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
) -> ApiResult<StatusCode> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;
    let _guard = state.edit_lock.lock().await;

    if !state.definitions.delete_workflow(&workflow_id)? {
        return Err(EngineError::not_found("workflow", workflow_id).into());
    }
    tracing::info!("Deleted workflow: {}", workflow_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Insert a step, shifting later steps down
pub async fn add_step(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
    Json(input): Json<StepInput>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;
    let _guard = state.edit_lock.lock().await;

    let mut workflow = load_workflow(&state, &workflow_id)?;
    let next = workflow.steps.len() as u32 + 1;
    workflow.insert_step(input.into_step(next));

    state.definitions.store_workflow(&workflow)?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateStepRequest {
    pub name: Option<String>,
    pub prompt_template: Option<String>,
    pub position: Option<u32>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub retry_limit: Option<u32>,
    pub context_mode: Option<ContextMode>,
    pub rule_type: Option<RuleType>,
    pub rule_value: Option<String>,
    pub llm_judge_enabled: Option<bool>,
    pub llm_judge_prompt: Option<String>,
}

pub async fn update_step(
    State(state): State<Arc<AppState>>,
    Path((workflow_id, step_id)): Path<(String, String)>,
    Json(req): Json<UpdateStepRequest>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;
    let step_id: StepId = parse_id("step", &step_id)?;
    let _guard = state.edit_lock.lock().await;

    let mut workflow = load_workflow(&state, &workflow_id)?;
    let step = workflow
        .steps
        .iter_mut()
        .find(|s| s.id == step_id)
        .ok_or_else(|| EngineError::not_found("step", step_id))?;

    if let Some(name) = req.name {
        step.name = name;
    }
    if let Some(prompt_template) = req.prompt_template {
        step.prompt_template = prompt_template;
    }
    if let Some(model) = req.model {
        step.model = model;
    }
    if let Some(max_tokens) = req.max_tokens {
        step.max_tokens = max_tokens;
    }
    if let Some(temperature) = req.temperature {
        step.temperature = temperature;
    }
    if let Some(retry_limit) = req.retry_limit {
        step.retry_limit = retry_limit;
    }
    if let Some(context_mode) = req.context_mode {
        step.context_mode = context_mode;
    }
    if let Some(rule_type) = req.rule_type {
        step.rule_type = rule_type;
    }
    if req.rule_value.is_some() {
        step.rule_value = req.rule_value;
    }
    if let Some(enabled) = req.llm_judge_enabled {
        step.llm_judge_enabled = enabled;
    }
    if req.llm_judge_prompt.is_some() {
        step.llm_judge_prompt = req.llm_judge_prompt;
    }

    if let Some(position) = req.position {
        workflow.move_step(&step_id, position);
    } else {
        workflow.touch();
    }

    state.definitions.store_workflow(&workflow)?;
    Ok(Json(workflow))
}

/// Remove a step and close the gap in positions
pub async fn delete_step(
    State(state): State<Arc<AppState>>,
    Path((workflow_id, step_id)): Path<(String, String)>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;
    let step_id: StepId = parse_id("step", &step_id)?;
    let _guard = state.edit_lock.lock().await;

    let mut workflow = load_workflow(&state, &workflow_id)?;
    workflow
        .remove_step(&step_id)
        .ok_or_else(|| EngineError::not_found("step", step_id))?;

    state.definitions.store_workflow(&workflow)?;
    Ok(Json(workflow))
}

/// Start a run; it executes in the background
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
) -> ApiResult<(StatusCode, Json<WorkflowRun>)> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;

    let run = state.engine.start_run(&workflow_id)?;
    tracing::info!("Started workflow run: run_id={}", run.id);

    Ok((StatusCode::ACCEPTED, Json(run)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListRunsResponse {
    pub runs: Vec<WorkflowRun>,
}

/// Runs of one workflow, newest first
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(workflow_id): Path<String>,
) -> ApiResult<Json<ListRunsResponse>> {
    let workflow_id: WorkflowId = parse_id("workflow", &workflow_id)?;
    let runs = state.engine.list_runs(&workflow_id)?;
    Ok(Json(ListRunsResponse { runs }))
}

/// Get a specific run with its attempts
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunDetail>> {
    let run_id: RunId = parse_id("run", &run_id)?;
    Ok(Json(state.engine.get_run(&run_id)?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetLogsResponse {
    pub logs: Vec<LlmCallLog>,
}

pub async fn get_run_logs(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<GetLogsResponse>> {
    let run_id: RunId = parse_id("run", &run_id)?;
    let logs = state.engine.get_logs(&run_id)?;
    Ok(Json(GetLogsResponse { logs }))
}

pub async fn get_step_run_logs(
    State(state): State<Arc<AppState>>,
    Path((run_id, step_run_id)): Path<(String, String)>,
) -> ApiResult<Json<GetLogsResponse>> {
    let run_id: RunId = parse_id("run", &run_id)?;
    let step_run_id: StepRunId = parse_id("step run", &step_run_id)?;
    let logs = state.engine.get_step_run_logs(&run_id, &step_run_id)?;
    Ok(Json(GetLogsResponse { logs }))
}
