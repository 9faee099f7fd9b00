//! Engine tuning knobs loaded from the `[engine]` section of the config file.

use crate::workflow::context::DEFAULT_SUMMARY_MAX_CHARS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when the judge cannot be reached after the rule passed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeFailurePolicy {
    /// Treat it like any other infrastructure failure: the run fails.
    #[default]
    FailRun,
    /// Record the judge as skipped and let the rule result decide.
    RuleStands,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bound on a single LLM call, main or judge
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_judge_max_tokens")]
    pub judge_max_tokens: u32,

    #[serde(default)]
    pub judge_temperature: f32,

    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    #[serde(default)]
    pub judge_failure_policy: JudgeFailurePolicy,
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_judge_max_tokens() -> u32 {
    512
}

fn default_summary_max_chars() -> usize {
    DEFAULT_SUMMARY_MAX_CHARS
}

impl EngineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Reject values that would fail every call or empty every summary.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.call_timeout_secs == 0 {
            anyhow::bail!("engine.call_timeout_secs must be greater than 0");
        }
        if self.summary_max_chars == 0 {
            anyhow::bail!("engine.summary_max_chars must be greater than 0");
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            judge_max_tokens: default_judge_max_tokens(),
            judge_temperature: 0.0,
            summary_max_chars: default_summary_max_chars(),
            judge_failure_policy: JudgeFailurePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_table() {
        let config: EngineConfig = toml_like_json("{}");
        assert_eq!(config.call_timeout_secs, 60);
        assert_eq!(config.judge_max_tokens, 512);
        assert_eq!(config.judge_temperature, 0.0);
        assert_eq!(config.summary_max_chars, 500);
        assert_eq!(config.judge_failure_policy, JudgeFailurePolicy::FailRun);
    }

    #[test]
    fn test_policy_is_snake_case() {
        let config: EngineConfig = toml_like_json(r#"{"judge_failure_policy": "rule_stands"}"#);
        assert_eq!(config.judge_failure_policy, JudgeFailurePolicy::RuleStands);
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        assert!(EngineConfig::default().validate().is_ok());

        let err = toml_like_json(r#"{"call_timeout_secs": 0}"#).validate().unwrap_err();
        assert!(err.to_string().contains("call_timeout_secs"));

        let err = toml_like_json(r#"{"summary_max_chars": 0}"#).validate().unwrap_err();
        assert!(err.to_string().contains("summary_max_chars"));
    }

    fn toml_like_json(raw: &str) -> EngineConfig {
        serde_json::from_str(raw).unwrap()
    }
}
