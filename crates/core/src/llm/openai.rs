//! Client for OpenAI-compatible `/chat/completions` endpoints.

use super::pricing::{ModelPricing, PricingTable};
use super::{LlmClient, LlmError, LlmRequest, LlmResponse};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Connection settings for the generation service
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiCompatConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// HTTP-level timeout for one request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra tries after a connect error or timeout
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub pricing: Vec<ModelPricing>,
}

fn default_base_url() -> String {
    "https://api.getunbound.ai/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_transport_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            transport_retries: default_transport_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            pricing: Vec::new(),
        }
    }
}

impl std::fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("transport_retries", &self.transport_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("pricing", &self.pricing)
            .finish()
    }
}

/// reqwest-backed [`LlmClient`]
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    transport_retries: u32,
    retry_backoff: Duration,
    pricing: PricingTable,
}

impl OpenAiCompatClient {
    pub fn new(config: &OpenAiCompatConfig) -> Result<Self, LlmError> {
        let mut headers = header::HeaderMap::new();

        if let Some(ref api_key) = config.api_key {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
                    LlmError::Authentication("API key contains invalid characters".to_string())
                })?,
            );
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            timeout,
            transport_retries: config.transport_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            pricing: PricingTable::with_overrides(&config.pricing),
        })
    }

    async fn send_with_retry(&self, body: &ChatCompletionRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let mut attempts = 0;

        loop {
            match self.client.post(&self.endpoint).json(body).send().await {
                Ok(response) => return Ok(response),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempts < self.transport_retries => {
                    let backoff = self.retry_backoff * 2_u32.pow(attempts);
                    warn!(
                        attempt = attempts + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "LLM transport failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempts += 1;
                }
                Err(e) if e.is_timeout() => return Err(LlmError::Timeout(self.timeout)),
                Err(e) => return Err(LlmError::Unreachable(e.to_string())),
            }
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %request.model, endpoint = %self.endpoint, "chat completion request");
        let start = Instant::now();
        let response = self.send_with_retry(&body).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication(body),
                _ => LlmError::Http {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout)
            } else {
                LlmError::InvalidResponse(e.to_string())
            }
        })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = completion.usage.unwrap_or_default();

        Ok(LlmResponse {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost_usd: self
                .pricing
                .estimate(&request.model, usage.prompt_tokens, usage.completion_tokens),
            latency_ms,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
