use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::llm::{timed_generate, LlmClient, LlmRequest};
use crate::storage::ExecutionStore;
use crate::types::{
    CallType, EvaluationResult, RunId, StepDefinition, StepRun, StepRunId, StepStatus,
};
use crate::workflow::context::ContextTransformer;
use crate::workflow::evaluation::{CompletionEvaluator, JudgeInvoker};
use crate::workflow::prompt::{inject_feedback, render_prompt};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one attempt that reached a verdict
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub step_run_id: StepRunId,
    pub output: String,
    pub extracted_context: Option<String>,
    pub evaluation: EvaluationResult,
    pub success: bool,
    pub failure_reason: Option<String>,
}

/// Runs one attempt of one step and records it
///
/// Semantic failures come back as an unsuccessful [`AttemptResult`]. Failures
/// of the LLM service or the store are returned as errors, after the attempt
/// that hit them has been recorded where possible.
pub struct StepExecutor {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn ExecutionStore>,
    evaluator: CompletionEvaluator,
    transformer: ContextTransformer,
    call_timeout: Duration,
}

impl StepExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn ExecutionStore>, config: &EngineConfig) -> Self {
        let judge = JudgeInvoker::new(
            llm.clone(),
            config.judge_max_tokens,
            config.judge_temperature,
            config.call_timeout(),
        );

        Self {
            llm,
            store,
            evaluator: CompletionEvaluator::new(judge, config.judge_failure_policy),
            transformer: ContextTransformer::new(config.summary_max_chars),
            call_timeout: config.call_timeout(),
        }
    }

    pub async fn attempt(
        &self,
        run_id: RunId,
        step: &StepDefinition,
        input_context: &str,
        attempt_number: u32,
        prior_failure_reason: Option<&str>,
    ) -> EngineResult<AttemptResult> {
        tracing::info!(
            run_id = %run_id,
            step = %step.name,
            attempt = attempt_number,
            max_attempts = step.max_attempts(),
            "Executing step attempt"
        );

        let mut step_run = StepRun {
            id: StepRunId::new(),
            workflow_run_id: run_id,
            workflow_step_id: step.id,
            position: step.position,
            status: StepStatus::Running,
            attempt_number,
            input_context: input_context.to_string(),
            output: None,
            extracted_context: None,
            evaluation_result: None,
            failure_reason: None,
            started_at: Utc::now(),
            completed_at: None,
            created_at: Utc::now(),
        };

        let rendered = render_prompt(&step.prompt_template, input_context);
        let request = LlmRequest {
            prompt: inject_feedback(&rendered, attempt_number, prior_failure_reason),
            model: step.model.clone(),
            max_tokens: step.max_tokens,
            temperature: step.temperature,
        };

        let (main_call, generated) = timed_generate(
            self.llm.as_ref(),
            &request,
            CallType::for_attempt(attempt_number),
            self.call_timeout,
        )
        .await;
        let mut logs = vec![main_call.into_log(step_run.id, attempt_number)];

        let response = match generated {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(run_id = %run_id, step = %step.name, attempt = attempt_number, error = %e, "LLM call failed");
                let reason = format!("infrastructure error: {}", e);
                step_run.status = StepStatus::Failed;
                step_run.evaluation_result = Some(EvaluationResult {
                    passed: false,
                    reason: Some(reason.clone()),
                    error: Some(e.to_string()),
                    ..Default::default()
                });
                step_run.failure_reason = Some(reason);
                step_run.completed_at = Some(Utc::now());
                self.store.record_attempt(&step_run, &logs)?;
                return Err(EngineError::Infrastructure(e.to_string()));
            }
        };

        let evaluation = self.evaluator.evaluate(step, &response.text).await;
        if let Some(judge_call) = evaluation.judge_call {
            logs.push(judge_call.into_log(step_run.id, attempt_number));
        }

        step_run.output = Some(response.text.clone());
        step_run.completed_at = Some(Utc::now());

        if let Some(e) = evaluation.infra_error {
            tracing::error!(run_id = %run_id, step = %step.name, attempt = attempt_number, error = %e, "Judge call failed");
            step_run.status = StepStatus::Failed;
            step_run.failure_reason = evaluation.result.reason.clone();
            step_run.evaluation_result = Some(evaluation.result);
            self.store.record_attempt(&step_run, &logs)?;
            return Err(EngineError::Infrastructure(format!("judge call failed: {}", e)));
        }

        let success = evaluation.result.passed;
        let extracted_context =
            success.then(|| self.transformer.transform(&response.text, step.context_mode));
        let failure_reason = if success {
            None
        } else {
            Some(
                evaluation
                    .result
                    .reason
                    .clone()
                    .unwrap_or_else(|| "completion criteria not met".to_string()),
            )
        };

        step_run.status = if success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        step_run.extracted_context = extracted_context.clone();
        step_run.failure_reason = failure_reason.clone();
        step_run.evaluation_result = Some(evaluation.result.clone());
        self.store.record_attempt(&step_run, &logs)?;

        if success {
            tracing::info!(run_id = %run_id, step = %step.name, attempt = attempt_number, "Step attempt passed");
        } else {
            tracing::warn!(
                run_id = %run_id,
                step = %step.name,
                attempt = attempt_number,
                reason = failure_reason.as_deref().unwrap_or_default(),
                "Step attempt failed"
            );
        }

        Ok(AttemptResult {
            step_run_id: step_run.id,
            output: response.text,
            extracted_context,
            evaluation: evaluation.result,
            success,
            failure_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::storage::RedbStore;
    use crate::testing::ScriptedLlmClient;
    use crate::types::{ContextMode, RunStatus, RuleType, WorkflowDefinition, WorkflowRun};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<RedbStore>,
        llm: Arc<ScriptedLlmClient>,
        executor: StepExecutor,
        run_id: RunId,
    }

    fn harness(llm: ScriptedLlmClient, config: EngineConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbStore::new(dir.path().join("stepwise.redb")).unwrap());
        let llm = Arc::new(llm);

        let workflow = WorkflowDefinition::new("wf", None);
        let run = WorkflowRun::pending(workflow.id);
        store.create_run(&run, &workflow).unwrap();
        store.transition_run(&run.id, RunStatus::Running, None).unwrap();

        let executor = StepExecutor::new(llm.clone(), store.clone(), &config);
        Harness {
            _dir: dir,
            store,
            llm,
            executor,
            run_id: run.id,
        }
    }

    fn contains_step(value: &str) -> StepDefinition {
        let mut step = StepDefinition::new(1, "answer", "Question: {{context}}", RuleType::Contains);
        step.rule_value = Some(value.to_string());
        step.context_mode = ContextMode::Full;
        step
    }

    #[tokio::test]
    async fn test_successful_attempt_is_recorded() {
        let h = harness(ScriptedLlmClient::with_texts(["result: OK done"]), EngineConfig::default());
        let step = contains_step("OK");

        let result = h.executor.attempt(h.run_id, &step, "2+2", 1, None).await.unwrap();

        assert!(result.success);
        assert_eq!(result.extracted_context.as_deref(), Some("result: OK done"));
        assert_eq!(h.llm.requests()[0].prompt, "Question: 2+2");

        let step_runs = h.store.list_step_runs(&h.run_id).unwrap();
        assert_eq!(step_runs.len(), 1);
        assert_eq!(step_runs[0].status, StepStatus::Completed);
        assert_eq!(step_runs[0].input_context, "2+2");

        let logs = h.store.get_logs(&h.run_id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].call_type, CallType::Main);
        assert_eq!(logs[0].step_run_id, result.step_run_id);
        assert_eq!(logs[0].total_tokens, logs[0].input_tokens + logs[0].output_tokens);
    }

    #[tokio::test]
    async fn test_retry_carries_feedback_and_call_type() {
        let h = harness(ScriptedLlmClient::with_texts(["still nothing"]), EngineConfig::default());
        let step = contains_step("OK");

        let result = h
            .executor
            .attempt(h.run_id, &step, "ctx", 2, Some("rule 'contains' failed"))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.extracted_context.is_none());
        assert!(result.failure_reason.unwrap().contains("contains"));
        assert!(h.llm.requests()[0]
            .prompt
            .contains("Previous attempt failed: rule 'contains' failed. Revise and retry."));
        assert_eq!(h.store.get_logs(&h.run_id).unwrap()[0].call_type, CallType::Retry);
    }

    #[tokio::test]
    async fn test_judge_call_logged_with_attempt() {
        let llm = ScriptedLlmClient::with_texts(["OK", r#"{"pass": false, "reason": "too short"}"#]);
        let h = harness(llm, EngineConfig::default());
        let mut step = contains_step("OK");
        step.llm_judge_enabled = true;
        step.llm_judge_prompt = Some("Is it thorough?".to_string());

        let result = h.executor.attempt(h.run_id, &step, "", 1, None).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.failure_reason.as_deref(), Some("too short"));

        let logs = h.store.get_logs(&h.run_id).unwrap();
        let call_types: Vec<CallType> = logs.iter().map(|l| l.call_type).collect();
        assert_eq!(call_types, vec![CallType::Main, CallType::LlmJudge]);
        assert!(logs.iter().all(|l| l.attempt_number == 1));
    }

    #[tokio::test]
    async fn test_infrastructure_failure_is_recorded_then_raised() {
        let llm = ScriptedLlmClient::new();
        llm.push_error(LlmError::Authentication("invalid key".to_string()));
        let h = harness(llm, EngineConfig::default());

        let err = h
            .executor
            .attempt(h.run_id, &contains_step("OK"), "", 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Infrastructure(_)));

        let step_runs = h.store.list_step_runs(&h.run_id).unwrap();
        assert_eq!(step_runs.len(), 1);
        assert_eq!(step_runs[0].status, StepStatus::Failed);
        assert!(step_runs[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("infrastructure error"));

        let logs = h.store.get_logs(&h.run_id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].response, "");
        assert_eq!(logs[0].total_tokens, 0);
    }

    #[tokio::test]
    async fn test_call_timeout_is_infrastructure() {
        let llm = ScriptedLlmClient::new();
        llm.push_delayed(Duration::from_secs(5), "OK");
        let config = EngineConfig {
            call_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let h = harness(llm, config);

        let err = h
            .executor
            .attempt(h.run_id, &contains_step("OK"), "", 1, None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("timed out"));
    }
}
