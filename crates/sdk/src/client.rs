//! Main client for the Stepwise SDK.

use crate::api::{HealthApi, RunsApi, WorkflowsApi};
use crate::config::{default_user_agent, ClientConfig, RetryConfig, DEFAULT_TIMEOUT};
use crate::error::{StepwiseError, StepwiseResult};
use crate::transport::HttpTransport;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Client for the Stepwise API. Cheap to clone.
#[derive(Clone)]
pub struct StepwiseClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl StepwiseClient {
    pub fn builder() -> StepwiseClientBuilder {
        StepwiseClientBuilder::new()
    }

    fn from_config(config: ClientConfig) -> StepwiseResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn health(&self) -> HealthApi<'_> {
        HealthApi::new(self)
    }

    pub fn workflows(&self) -> WorkflowsApi<'_> {
        WorkflowsApi::new(self)
    }

    pub fn runs(&self) -> RunsApi<'_> {
        RunsApi::new(self)
    }
}

pub struct StepwiseClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    retry_config: RetryConfig,
    user_agent: Option<String>,
}

impl StepwiseClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            retry_config: RetryConfig::default(),
            user_agent: None,
        }
    }

    /// Base URL of the Stepwise server, e.g. `http://localhost:8080`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> StepwiseResult<StepwiseClient> {
        let base_url_str = self
            .base_url
            .ok_or_else(|| StepwiseError::Config("base_url is required".to_string()))?;

        let base_url = Url::parse(&base_url_str)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(StepwiseError::Config(format!(
                "unsupported URL scheme: {}",
                base_url.scheme()
            )));
        }

        let config = ClientConfig {
            base_url,
            api_key: self.api_key,
            timeout: self.timeout,
            retry_config: self.retry_config,
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
        };

        StepwiseClient::from_config(config)
    }
}

impl Default for StepwiseClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{StepInput, UpdateStepRequest};
    use stepwise_core::types::{
        RuleType, RunStatus, StepDefinition, StepRunId, WorkflowDefinition, WorkflowId,
        WorkflowRun,
    };
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StepwiseClient {
        StepwiseClient::builder()
            .base_url(server.uri())
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap()
    }

    fn workflow_with_step() -> WorkflowDefinition {
        let mut workflow = WorkflowDefinition::new("summarize", None);
        let mut step = StepDefinition::new(1, "draft", "{{context}}", RuleType::Contains);
        step.rule_value = Some("Summary".to_string());
        workflow.insert_step(step);
        workflow
    }

    #[test]
    fn test_builder_requires_base_url() {
        let result = StepwiseClient::builder().build();
        assert!(matches!(result, Err(StepwiseError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_bad_urls() {
        assert!(matches!(
            StepwiseClient::builder().base_url("not a url").build(),
            Err(StepwiseError::InvalidUrl(_))
        ));
        assert!(matches!(
            StepwiseClient::builder().base_url("ftp://localhost").build(),
            Err(StepwiseError::Config(_))
        ));
    }

    #[test]
    fn test_builder_settings() {
        let client = StepwiseClient::builder()
            .base_url("http://localhost:8080")
            .api_key("sk-test")
            .timeout(Duration::from_secs(5))
            .user_agent("my-app/1.0")
            .build()
            .unwrap();

        assert_eq!(client.config().api_key.as_deref(), Some("sk-test"));
        assert_eq!(client.config().timeout, Duration::from_secs(5));
        assert_eq!(client.config().user_agent, "my-app/1.0");
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "service": "stepwise",
                "version": "0.1.0"
            })))
            .mount(&server)
            .await;

        let health = client(&server).health().check().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.service.as_deref(), Some("stepwise"));
    }

    #[tokio::test]
    async fn test_create_and_run_workflow() {
        let server = MockServer::start().await;
        let workflow = workflow_with_step();
        let run = WorkflowRun::pending(workflow.id);

        Mock::given(method("POST"))
            .and(path("/api/workflows"))
            .and(body_partial_json(serde_json::json!({
                "name": "summarize",
                "steps": [{ "name": "draft", "rule_type": "contains", "rule_value": "Summary" }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(&workflow))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/api/workflows/{}/run", workflow.id)))
            .respond_with(ResponseTemplate::new(202).set_body_json(&run))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let created = client
            .workflows()
            .create(
                "summarize",
                None,
                vec![StepInput::new("draft", "{{context}}", RuleType::Contains).rule_value("Summary")],
            )
            .await
            .unwrap();
        assert_eq!(created.id, workflow.id);
        assert_eq!(created.steps.len(), 1);

        let started = client.workflows().run(&created.id).await.unwrap();
        assert_eq!(started.id, run.id);
        assert_eq!(started.status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn test_move_step() {
        let server = MockServer::start().await;
        let workflow = workflow_with_step();
        let step_id = workflow.steps[0].id;

        Mock::given(method("PATCH"))
            .and(path(format!("/api/workflows/{}/steps/{}", workflow.id, step_id)))
            .and(body_partial_json(serde_json::json!({ "position": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&workflow))
            .expect(1)
            .mount(&server)
            .await;

        let updated = client(&server)
            .workflows()
            .update_step(
                &workflow.id,
                &step_id,
                &UpdateStepRequest {
                    position: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.steps[0].id, step_id);
    }

    #[tokio::test]
    async fn test_delete_workflow_no_content() {
        let server = MockServer::start().await;
        let workflow_id = WorkflowId::new();

        Mock::given(method("DELETE"))
            .and(path(format!("/api/workflows/{}", workflow_id)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).workflows().delete(&workflow_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_workflow_is_not_found() {
        let server = MockServer::start().await;
        let workflow_id = WorkflowId::new();

        Mock::given(method("GET"))
            .and(path(format!("/api/workflows/{}", workflow_id)))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": format!("workflow not found: {}", workflow_id)
            })))
            .mount(&server)
            .await;

        let err = client(&server).workflows().get(&workflow_id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_wait_polls_until_terminal() {
        let server = MockServer::start().await;
        let workflow_id = WorkflowId::new();
        let run = WorkflowRun::pending(workflow_id);

        let running = serde_json::json!({
            "id": run.id, "workflow_id": workflow_id, "status": "running",
            "failure_reason": null, "started_at": null, "completed_at": null,
            "created_at": run.created_at, "step_runs": []
        });
        let completed = serde_json::json!({
            "id": run.id, "workflow_id": workflow_id, "status": "completed",
            "failure_reason": null, "started_at": null, "completed_at": null,
            "created_at": run.created_at, "step_runs": []
        });

        Mock::given(method("GET"))
            .and(path(format!("/api/runs/{}", run.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(running))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/runs/{}", run.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(completed))
            .mount(&server)
            .await;

        let detail = client(&server)
            .runs()
            .wait(&run.id, Duration::from_millis(5))
            .await
            .unwrap();

        assert_eq!(detail.run.status, RunStatus::Completed);
        assert!(detail.step_runs.is_empty());
    }

    #[tokio::test]
    async fn test_step_logs_path() {
        let server = MockServer::start().await;
        let run = WorkflowRun::pending(WorkflowId::new());
        let step_run_id = StepRunId::new();

        Mock::given(method("GET"))
            .and(path(format!("/api/runs/{}/steps/{}/logs", run.id, step_run_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "logs": [] })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/workflows/{}/runs", run.workflow_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "runs": [run] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let logs = client.runs().step_logs(&run.id, &step_run_id).await.unwrap();
        assert!(logs.is_empty());

        let runs = client.runs().list_for_workflow(&run.workflow_id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run.id);
    }
}
