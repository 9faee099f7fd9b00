//! LLM generation service used by step attempts and the judge.

pub mod openai;
pub mod pricing;

pub use crate::error::LlmError;
pub use openai::{OpenAiCompatClient, OpenAiCompatConfig};
pub use pricing::{ModelPricing, PricingTable};

use crate::types::{CallType, LlmCallLog, LlmLogId, StepRunId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Request to the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Completion returned by the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// Generation service abstraction
///
/// Implementations return `Err` only for infrastructure failures (network,
/// authentication, timeouts, malformed responses). Whatever the model says,
/// however unhelpful, comes back as `Ok`.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Everything about one LLM invocation that ends up in the call log
#[derive(Debug, Clone, PartialEq)]
pub struct LlmCallRecord {
    pub call_type: CallType,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

impl LlmCallRecord {
    pub fn into_log(self, step_run_id: StepRunId, attempt_number: u32) -> LlmCallLog {
        LlmCallLog {
            id: LlmLogId::new(),
            step_run_id,
            call_type: self.call_type,
            attempt_number,
            prompt: self.prompt,
            response: self.response,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.input_tokens + self.output_tokens,
            cost_usd: self.cost_usd,
            model: self.model,
            latency_ms: self.latency_ms,
            created_at: Utc::now(),
        }
    }
}

/// Invoke `client` bounded by `timeout`.
///
/// A record is produced even when the call fails, so that the attempt that hit
/// the failure still shows up in the audit trail.
pub async fn timed_generate(
    client: &dyn LlmClient,
    request: &LlmRequest,
    call_type: CallType,
    timeout: Duration,
) -> (LlmCallRecord, Result<LlmResponse, LlmError>) {
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, client.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    };

    let mut record = LlmCallRecord {
        call_type,
        model: request.model.clone(),
        prompt: request.prompt.clone(),
        response: String::new(),
        input_tokens: 0,
        output_tokens: 0,
        cost_usd: 0.0,
        latency_ms: start.elapsed().as_millis() as u64,
    };

    if let Ok(ref response) = result {
        record.response = response.text.clone();
        record.input_tokens = response.input_tokens;
        record.output_tokens = response.output_tokens;
        record.cost_usd = response.cost_usd;
        record.latency_ms = response.latency_ms;
    }

    (record, result)
}
