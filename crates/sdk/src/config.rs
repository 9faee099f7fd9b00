//! Configuration types for the Stepwise SDK.

use std::time::Duration;
use url::Url;

/// Default request timeout. Starting a run returns immediately, so this only
/// bounds single API calls, never a whole workflow execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Stepwise client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Stepwise server.
    pub base_url: Url,
    /// Bearer token sent with every request, for deployments behind an auth proxy.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry configuration.
    pub retry_config: RetryConfig,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            retry_config: RetryConfig::default(),
            user_agent: default_user_agent(),
        }
    }
}

pub(crate) fn default_user_agent() -> String {
    format!("stepwise-sdk/{}", env!("CARGO_PKG_VERSION"))
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first request.
    pub max_retries: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// HTTP status codes to retry on.
    pub retry_on_status_codes: Vec<u16>,
    /// Whether requests that time out are retried.
    pub retry_on_timeout: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            retry_on_status_codes: vec![429, 500, 502, 503, 504],
            retry_on_timeout: true,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Backoff before retry number `attempt` (0-based), capped at `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        std::cmp::min(backoff, self.max_backoff)
    }

    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status_codes.contains(&status)
    }

    /// Whether another retry is allowed after `attempts` retries.
    pub fn has_budget(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let config = RetryConfig {
            max_backoff: Duration::from_millis(500),
            ..Default::default()
        };

        assert_eq!(config.backoff_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn test_retryable_statuses() {
        let config = RetryConfig::default();

        assert!(config.should_retry_status(429));
        assert!(config.should_retry_status(503));
        assert!(!config.should_retry_status(400));
        assert!(!config.should_retry_status(404));
        assert!(!config.should_retry_status(409));
    }

    #[test]
    fn test_retry_budget() {
        let config = RetryConfig::default().with_max_retries(2);

        assert!(config.has_budget(0));
        assert!(config.has_budget(1));
        assert!(!config.has_budget(2));
        assert!(!RetryConfig::no_retry().has_budget(0));
    }

    #[test]
    fn test_client_config_defaults() {
        let url = Url::parse("http://localhost:8080").unwrap();
        let config = ClientConfig::new(url.clone());

        assert_eq!(config.base_url, url);
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.retry_config.max_retries, 3);
        assert!(config.retry_config.retry_on_timeout);
        assert!(config.user_agent.starts_with("stepwise-sdk/"));
    }
}
