//! Two-phase completion evaluation: a cheap rule first, then the optional judge.

pub mod judge;
pub mod rules;

pub use judge::{parse_verdict, JudgeInvoker, JudgeVerdict};
pub use rules::{Rule, RuleConfigError, RuleVerdict};

use crate::config::JudgeFailurePolicy;
use crate::llm::{LlmCallRecord, LlmError};
use crate::types::{EvaluationResult, StepDefinition};
use tracing::{debug, warn};

pub const EMPTY_OUTPUT_REASON: &str = "LLM output was empty";

/// Result of evaluating one attempt's output
#[derive(Debug)]
pub struct Evaluation {
    pub result: EvaluationResult,
    /// Judge invocation to be logged with the attempt
    pub judge_call: Option<LlmCallRecord>,
    /// Set when the judge could not be reached and the policy fails the run
    pub infra_error: Option<LlmError>,
}

impl Evaluation {
    fn settled(result: EvaluationResult) -> Self {
        Self {
            result,
            judge_call: None,
            infra_error: None,
        }
    }
}

pub struct CompletionEvaluator {
    judge: JudgeInvoker,
    judge_failure_policy: JudgeFailurePolicy,
}

impl CompletionEvaluator {
    pub fn new(judge: JudgeInvoker, judge_failure_policy: JudgeFailurePolicy) -> Self {
        Self {
            judge,
            judge_failure_policy,
        }
    }

    pub async fn evaluate(&self, step: &StepDefinition, output: &str) -> Evaluation {
        if output.trim().is_empty() {
            return Evaluation::settled(EvaluationResult {
                passed: false,
                reason: Some(EMPTY_OUTPUT_REASON.to_string()),
                ..Default::default()
            });
        }

        let verdict = match Rule::from_config(step.rule_type, step.rule_value.as_deref()) {
            Ok(rule) => rule.evaluate(output),
            // Definitions are validated before a run starts; a bad rule here
            // is reported as a failed rule rather than an error.
            Err(e) => RuleVerdict {
                passed: false,
                reason: format!("rule '{}' could not be evaluated: {}", step.rule_type, e),
            },
        };
        debug!(step = %step.name, passed = verdict.passed, reason = %verdict.reason, "rule verdict");

        let mut result = EvaluationResult {
            passed: verdict.passed,
            reason: Some(verdict.reason.clone()),
            rule_passed: Some(verdict.passed),
            rule_reason: Some(verdict.reason),
            ..Default::default()
        };

        if !result.passed || !step.llm_judge_enabled {
            return Evaluation::settled(result);
        }

        let judge_prompt = step.llm_judge_prompt.as_deref().unwrap_or_default();
        let (record, judged) = self.judge.judge(step, judge_prompt, output).await;

        let infra_error = match judged {
            Ok(judge) => {
                debug!(step = %step.name, passed = judge.passed, reason = %judge.reason, "judge verdict");
                result.passed = judge.passed;
                result.judge_passed = Some(judge.passed);
                if !judge.passed {
                    result.reason = Some(judge.reason.clone());
                }
                result.judge_reason = Some(judge.reason);
                None
            }
            Err(e) => match self.judge_failure_policy {
                JudgeFailurePolicy::FailRun => {
                    result.passed = false;
                    result.reason = Some(format!("judge call failed: {}", e));
                    result.error = Some(e.to_string());
                    Some(e)
                }
                JudgeFailurePolicy::RuleStands => {
                    warn!(step = %step.name, error = %e, "judge unavailable, keeping rule result");
                    result.judge_skipped = true;
                    result.judge_reason = Some(format!("judge unavailable: {}", e));
                    result.error = Some(e.to_string());
                    None
                }
            },
        };

        Evaluation {
            result,
            judge_call: Some(record),
            infra_error,
        }
    }
}
