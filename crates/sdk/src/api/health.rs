use crate::client::StepwiseClient;
use crate::error::StepwiseResult;
use serde::{Deserialize, Serialize};

pub struct HealthApi<'a> {
    client: &'a StepwiseClient,
}

impl<'a> HealthApi<'a> {
    pub(crate) fn new(client: &'a StepwiseClient) -> Self {
        Self { client }
    }

    /// Check that the server is up.
    pub async fn check(&self) -> StepwiseResult<HealthCheck> {
        self.client.http.get("/api/health").await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
