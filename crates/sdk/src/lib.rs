//! # Stepwise SDK
//!
//! Typed async client for the Stepwise HTTP API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stepwise_sdk::{RuleType, StepInput, StepwiseClient, StepwiseResult};
//!
//! #[tokio::main]
//! async fn main() -> StepwiseResult<()> {
//!     let client = StepwiseClient::builder()
//!         .base_url("http://localhost:8080")
//!         .build()?;
//!
//!     let workflow = client
//!         .workflows()
//!         .create("summarize", None, vec![
//!             StepInput::new("draft", "Summarize: {{context}}", RuleType::Contains)
//!                 .rule_value("Summary"),
//!         ])
//!         .await?;
//!
//!     let run = client.workflows().run(&workflow.id).await?;
//!     let detail = client.runs().get(&run.id).await?;
//!     println!("Run {} is {}", detail.run.id, detail.run.status);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use api::{
    HealthCheck, StepInput, UpdateStepRequest, UpdateWorkflowRequest,
};
pub use client::{StepwiseClient, StepwiseClientBuilder};
pub use config::{ClientConfig, RetryConfig};
pub use error::{StepwiseError, StepwiseResult};

// Re-export core types for convenience
pub use stepwise_core::types::{
    CallType, ContextMode, EvaluationResult, LlmCallLog, RuleType, RunDetail, RunId, RunStatus,
    StepDefinition, StepId, StepRun, StepRunId, StepStatus, WorkflowDefinition, WorkflowId,
    WorkflowRun,
};
