//! Test doubles shared by the crates of the workspace.

use crate::llm::{LlmClient, LlmError, LlmRequest, LlmResponse};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

enum Scripted {
    Reply(Result<LlmResponse, LlmError>),
    Delayed(Duration, LlmResponse),
}

/// [`LlmClient`] that replays queued replies in order and records every request.
///
/// Once the queue is empty every call fails with `InvalidResponse`, which makes
/// an unexpected extra call visible in the run's failure reason.
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client preloaded with one text reply per element.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for text in texts {
            client.push_text(text);
        }
        client
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(Scripted::Reply(Ok(reply(text.into()))));
    }

    pub fn push_response(&self, response: LlmResponse) {
        self.push(Scripted::Reply(Ok(response)));
    }

    pub fn push_error(&self, error: LlmError) {
        self.push(Scripted::Reply(Err(error)));
    }

    /// Reply only after `delay`, for exercising call timeouts.
    pub fn push_delayed(&self, delay: Duration, text: impl Into<String>) {
        self.push(Scripted::Delayed(delay, reply(text.into())));
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }

    fn push(&self, scripted: Scripted) {
        lock(&self.script).push_back(scripted);
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        lock(&self.requests).push(request.clone());
        let next = lock(&self.script).pop_front();

        match next {
            Some(Scripted::Reply(result)) => result,
            Some(Scripted::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(LlmError::InvalidResponse("no scripted response left".to_string())),
        }
    }
}

fn reply(text: String) -> LlmResponse {
    let output_tokens = text.split_whitespace().count() as u32;
    LlmResponse {
        text,
        input_tokens: 10,
        output_tokens,
        cost_usd: 0.0001,
        latency_ms: 5,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
