// Core types and engine for Stepwise LLM workflows

pub mod config;
pub mod error;
pub mod llm;
pub mod storage;
pub mod types;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{EngineConfig, JudgeFailurePolicy};
pub use error::{EngineError, EngineResult, LlmError, ValidationError};
pub use types::*;
