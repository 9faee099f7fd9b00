//! Deterministic checks applied to raw step output.

use crate::types::RuleType;
use crate::workflow::context::first_code_block;
use regex::{Regex, RegexBuilder};

/// A rule bound to its configuration, ready to evaluate
#[derive(Debug, Clone)]
pub enum Rule {
    Contains(String),
    Regex(Regex),
    JsonValid,
    CodeBlockPresent,
}

/// Pass/fail plus a human-readable explanation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVerdict {
    pub passed: bool,
    pub reason: String,
}

impl RuleVerdict {
    fn pass(reason: String) -> Self {
        Self { passed: true, reason }
    }

    fn fail(reason: String) -> Self {
        Self { passed: false, reason }
    }
}

/// Why a rule could not be built from a step's configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleConfigError {
    #[error("rule '{0}' requires a rule_value")]
    MissingValue(RuleType),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl Rule {
    pub fn from_config(rule_type: RuleType, rule_value: Option<&str>) -> Result<Self, RuleConfigError> {
        let value = || {
            rule_value
                .filter(|v| !v.is_empty())
                .ok_or(RuleConfigError::MissingValue(rule_type))
        };

        match rule_type {
            RuleType::Contains => Ok(Rule::Contains(value()?.to_string())),
            RuleType::Regex => compile_pattern(value()?).map(Rule::Regex),
            RuleType::JsonValid => Ok(Rule::JsonValid),
            RuleType::CodeBlockPresent => Ok(Rule::CodeBlockPresent),
        }
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            Rule::Contains(_) => RuleType::Contains,
            Rule::Regex(_) => RuleType::Regex,
            Rule::JsonValid => RuleType::JsonValid,
            Rule::CodeBlockPresent => RuleType::CodeBlockPresent,
        }
    }

    pub fn evaluate(&self, output: &str) -> RuleVerdict {
        match self {
            Rule::Contains(needle) => {
                if output.contains(needle.as_str()) {
                    RuleVerdict::pass(format!("rule 'contains' passed: found {:?}", needle))
                } else {
                    RuleVerdict::fail(format!(
                        "rule 'contains' failed: expected output to contain {:?}",
                        needle
                    ))
                }
            }
            Rule::Regex(pattern) => {
                if pattern.is_match(output) {
                    RuleVerdict::pass(format!("rule 'regex' passed: /{}/ matched", pattern.as_str()))
                } else {
                    RuleVerdict::fail(format!(
                        "rule 'regex' failed: expected output to match /{}/",
                        pattern.as_str()
                    ))
                }
            }
            Rule::JsonValid => match serde_json::from_str::<serde_json::Value>(output.trim()) {
                Ok(_) => RuleVerdict::pass("rule 'json_valid' passed".to_string()),
                Err(e) => RuleVerdict::fail(format!(
                    "rule 'json_valid' failed: expected the whole output to be valid JSON ({})",
                    e
                )),
            },
            Rule::CodeBlockPresent => {
                if first_code_block(output).is_some() {
                    RuleVerdict::pass("rule 'code_block_present' passed".to_string())
                } else {
                    RuleVerdict::fail(
                        "rule 'code_block_present' failed: expected a fenced ``` code block".to_string(),
                    )
                }
            }
        }
    }
}

/// Patterns match across lines, so `.` also matches newlines.
pub fn compile_pattern(pattern: &str) -> Result<Regex, RuleConfigError> {
    RegexBuilder::new(pattern)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| RuleConfigError::InvalidPattern(e.to_string()))
}
