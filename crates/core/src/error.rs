//! Error types for the workflow engine.
//!
//! Semantic failures (a rule or judge rejecting output) are not errors: they are
//! reported through [`crate::types::EvaluationResult`] and drive the retry loop.
//! The types here cover the two remaining categories: definitions that cannot be
//! run at all, and infrastructure that failed underneath a run.

use crate::types::RuleType;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The workflow definition cannot be run; no run row was written.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// LLM service or persistence failure.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// Referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Storage layer failure.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Reasons a workflow definition is rejected before a run is created.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("workflow has no steps")]
    EmptyWorkflow,

    #[error("step positions must be 1..={expected_len} without gaps, found {found:?}")]
    NonContiguousPositions { expected_len: usize, found: Vec<u32> },

    #[error("step '{step}' uses rule '{rule_type}' but has no rule_value")]
    MissingRuleValue { step: String, rule_type: RuleType },

    #[error("step '{step}' has an invalid regex pattern: {message}")]
    InvalidPattern { step: String, message: String },

    #[error("step '{step}' at position {position} never reads the previous step's output; its prompt_template needs {{{{context}}}}")]
    MissingContextPlaceholder { step: String, position: u32 },

    #[error("step '{step}' enables the LLM judge but has no llm_judge_prompt")]
    MissingJudgePrompt { step: String },

    #[error("step '{step}' has an invalid {field}: {message}")]
    InvalidParameter {
        step: String,
        field: &'static str,
        message: String,
    },
}

/// Infrastructure failure from the LLM generation service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("LLM service unreachable: {0}")]
    Unreachable(String),

    #[error("LLM authentication failed: {0}")]
    Authentication(String),

    #[error("LLM service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("LLM service returned an invalid response: {0}")]
    InvalidResponse(String),
}
