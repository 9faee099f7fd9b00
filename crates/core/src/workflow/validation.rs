//! Checks a workflow definition must pass before a run is created.

use crate::error::ValidationError;
use crate::types::WorkflowDefinition;
use crate::workflow::evaluation::rules::{Rule, RuleConfigError};
use crate::workflow::prompt::CONTEXT_PLACEHOLDER;

pub fn validate_workflow(workflow: &WorkflowDefinition) -> Result<(), ValidationError> {
    if workflow.steps.is_empty() {
        return Err(ValidationError::EmptyWorkflow);
    }

    let steps = workflow.ordered_steps();
    let positions: Vec<u32> = steps.iter().map(|s| s.position).collect();
    if positions.iter().enumerate().any(|(i, p)| *p != i as u32 + 1) {
        return Err(ValidationError::NonContiguousPositions {
            expected_len: steps.len(),
            found: positions,
        });
    }

    for step in &steps {
        if let Err(e) = Rule::from_config(step.rule_type, step.rule_value.as_deref()) {
            return Err(match e {
                RuleConfigError::MissingValue(rule_type) => ValidationError::MissingRuleValue {
                    step: step.name.clone(),
                    rule_type,
                },
                RuleConfigError::InvalidPattern(message) => ValidationError::InvalidPattern {
                    step: step.name.clone(),
                    message,
                },
            });
        }

        // The first step starts from an empty context and may ignore it
        if step.position > 1 && !step.prompt_template.contains(CONTEXT_PLACEHOLDER) {
            return Err(ValidationError::MissingContextPlaceholder {
                step: step.name.clone(),
                position: step.position,
            });
        }

        if step.llm_judge_enabled
            && step
                .llm_judge_prompt
                .as_deref()
                .map_or(true, |p| p.trim().is_empty())
        {
            return Err(ValidationError::MissingJudgePrompt {
                step: step.name.clone(),
            });
        }

        if step.max_tokens == 0 {
            return Err(ValidationError::InvalidParameter {
                step: step.name.clone(),
                field: "max_tokens",
                message: "must be greater than 0".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&step.temperature) {
            return Err(ValidationError::InvalidParameter {
                step: step.name.clone(),
                field: "temperature",
                message: format!("{} is outside 0.0..=2.0", step.temperature),
            });
        }

        if step.model.trim().is_empty() {
            return Err(ValidationError::InvalidParameter {
                step: step.name.clone(),
                field: "model",
                message: "must not be empty".to_string(),
            });
        }
    }

    Ok(())
}
