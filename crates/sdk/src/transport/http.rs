//! HTTP transport with retry and exponential backoff.

use crate::config::ClientConfig;
use crate::error::{StepwiseError, StepwiseResult};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    pub fn new(config: Arc<ClientConfig>) -> StepwiseResult<Self> {
        let mut headers = header::HeaderMap::new();

        if let Some(ref api_key) = config.api_key {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                    .map_err(|_| StepwiseError::Config("Invalid API key format".to_string()))?,
            );
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Resolve `path` against the base URL, keeping any path prefix the base carries.
    fn build_url(&self, path: &str) -> StepwiseResult<url::Url> {
        let mut base = self.config.base_url.clone();
        if !base.path().ends_with('/') {
            let prefixed = format!("{}/", base.path());
            base.set_path(&prefixed);
        }
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    /// Send the request, retrying retryable statuses and timeouts.
    async fn execute_with_retry(&self, request_builder: RequestBuilder) -> StepwiseResult<Response> {
        let retry_config = &self.config.retry_config;
        let mut attempts = 0;

        loop {
            let request = request_builder
                .try_clone()
                .ok_or_else(|| StepwiseError::Config("Request cannot be cloned".to_string()))?;

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if retry_config.has_budget(attempts) && retry_config.should_retry_status(status) {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            status = status,
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(StepwiseError::from_response(status, &body));
                }
                Err(e) => {
                    if retry_config.has_budget(attempts) && retry_config.retry_on_timeout && e.is_timeout() {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            "Request timed out, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> StepwiseResult<Response> {
        let url = self.build_url(path)?;
        debug!(method = %method, url = %url, "Sending request");

        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute_with_retry(builder).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> StepwiseResult<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        Ok(response.json().await?)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> StepwiseResult<T> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        Ok(response.json().await?)
    }

    /// POST without a request body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> StepwiseResult<T> {
        let response = self.send::<()>(Method::POST, path, None).await?;
        Ok(response.json().await?)
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> StepwiseResult<T> {
        let response = self.send(Method::PATCH, path, Some(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> StepwiseResult<T> {
        let response = self.send::<()>(Method::DELETE, path, None).await?;
        Ok(response.json().await?)
    }

    /// DELETE whose response carries no body.
    pub async fn delete_no_response(&self, path: &str) -> StepwiseResult<()> {
        self.send::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Echo {
        name: String,
    }

    fn create_config(base_url: &str, retry_config: RetryConfig) -> Arc<ClientConfig> {
        let mut config = ClientConfig::new(url::Url::parse(base_url).unwrap());
        config.retry_config = retry_config.with_initial_backoff(Duration::from_millis(1));
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_patch_sends_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/things/1"))
            .and(body_json(serde_json::json!({"name": "renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(Echo {
                name: "renamed".to_string(),
            }))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), RetryConfig::no_retry())).unwrap();
        let echo: Echo = transport
            .patch("/api/things/1", &Echo { name: "renamed".to_string() })
            .await
            .unwrap();

        assert_eq!(echo.name, "renamed");
    }

    #[tokio::test]
    async fn test_bearer_token_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/health"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(url::Url::parse(&server.uri()).unwrap());
        config.api_key = Some("sk-test".to_string());
        let transport = HttpTransport::new(Arc::new(config)).unwrap();

        let body: serde_json::Value = transport.get("/api/health").await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Echo {
                name: "ok".to_string(),
            }))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), RetryConfig::default())).unwrap();
        let echo: Echo = transport.get("/api/flaky").await.unwrap();

        assert_eq!(echo.name, "ok");
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/down"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let retry = RetryConfig::default().with_max_retries(2);
        let transport = HttpTransport::new(create_config(&server.uri(), retry)).unwrap();
        let err = transport.get::<Echo>("/api/down").await.unwrap_err();

        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/workflows/x/run"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "Invalid workflow",
                "details": "workflow has no steps"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), RetryConfig::default())).unwrap();
        let err = transport
            .post_empty::<Echo>("/api/workflows/x/run")
            .await
            .unwrap_err();

        match err {
            StepwiseError::Api {
                status,
                message,
                details,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid workflow");
                assert_eq!(details.as_deref(), Some("workflow has no steps"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeouts_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(2)
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(url::Url::parse(&server.uri()).unwrap());
        config.timeout = Duration::from_millis(100);
        config.retry_config = RetryConfig::default()
            .with_max_retries(1)
            .with_initial_backoff(Duration::from_millis(1));
        let transport = HttpTransport::new(Arc::new(config)).unwrap();

        let err = transport.get::<Echo>("/api/slow").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_build_url_keeps_base_path() {
        let transport =
            HttpTransport::new(create_config("http://localhost:8080/stepwise", RetryConfig::no_retry())).unwrap();

        let url = transport.build_url("/api/health").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/stepwise/api/health");
    }

    #[tokio::test]
    async fn test_build_url_plain_host() {
        let transport =
            HttpTransport::new(create_config("http://localhost:8080", RetryConfig::no_retry())).unwrap();

        let url = transport.build_url("api/health").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/health");
    }
}
