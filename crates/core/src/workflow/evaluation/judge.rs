//! Secondary LLM call that renders a semantic verdict on a step's output.

use crate::llm::{timed_generate, LlmCallRecord, LlmClient, LlmError, LlmRequest};
use crate::types::{CallType, StepDefinition};
use crate::workflow::context::first_json_value;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const NO_REASON: &str = "No reason provided";

/// Verdict parsed from the judge's response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub passed: bool,
    pub reason: String,
}

pub struct JudgeInvoker {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl JudgeInvoker {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: u32, temperature: f32, timeout: Duration) -> Self {
        Self {
            llm,
            max_tokens,
            temperature,
            timeout,
        }
    }

    /// Ask the judge about `output`. The call record is returned whether or
    /// not the call succeeded.
    pub async fn judge(
        &self,
        step: &StepDefinition,
        judge_prompt: &str,
        output: &str,
    ) -> (LlmCallRecord, Result<JudgeVerdict, LlmError>) {
        let request = LlmRequest {
            prompt: judge_request_prompt(judge_prompt, output),
            model: step.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let (record, result) =
            timed_generate(self.llm.as_ref(), &request, CallType::LlmJudge, self.timeout).await;
        (record, result.map(|response| parse_verdict(&response.text)))
    }
}

pub fn judge_request_prompt(judge_prompt: &str, output: &str) -> String {
    format!("{judge_prompt}\n\n---\nOutput:\n{output}")
}

/// Read `{"pass": bool, "reason": str}` from the whole response or the first
/// JSON object inside it. Responses with neither fall back to looking for an
/// affirmative `true` that is not contradicted by a `false`.
pub fn parse_verdict(response: &str) -> JudgeVerdict {
    let parsed = serde_json::from_str::<Value>(response.trim())
        .ok()
        .filter(Value::is_object)
        .or_else(|| first_json_value(response).filter(Value::is_object));

    if let Some(Value::Object(map)) = parsed {
        if let Some(pass) = map.get("pass") {
            let passed = match pass {
                Value::Bool(b) => *b,
                Value::String(s) => s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("pass"),
                _ => false,
            };
            let reason = map
                .get("reason")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(NO_REASON)
                .to_string();
            return JudgeVerdict { passed, reason };
        }
    }

    let lower = response.to_lowercase();
    let passed = lower.contains("true") && !lower.contains("false");
    let reason = match response.trim() {
        "" => NO_REASON.to_string(),
        trimmed => trimmed.to_string(),
    };
    JudgeVerdict { passed, reason }
}
