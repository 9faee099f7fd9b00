//! Prompt rendering and retry feedback.
//!
//! Both functions are pure string composition, so a retry's prompt is fully
//! determined by the template, the input context and the previous failure.

/// Placeholder substituted with the step's input context
pub const CONTEXT_PLACEHOLDER: &str = "{{context}}";

/// Replace every context placeholder in `template` with `context`.
pub fn render_prompt(template: &str, context: &str) -> String {
    template.replace(CONTEXT_PLACEHOLDER, context)
}

/// Append the feedback block for attempts after the first.
///
/// Attempt 1 is returned unchanged. Later attempts always get a block, with a
/// generic reason if none was recorded.
pub fn inject_feedback(rendered: &str, attempt_number: u32, prior_failure_reason: Option<&str>) -> String {
    if attempt_number <= 1 {
        return rendered.to_string();
    }

    let reason = prior_failure_reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("output did not meet the completion criteria");

    format!(
        "{rendered}\n\n---\nPrevious attempt failed: {reason}. Revise and retry.\n\
         This is attempt {attempt_number}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_every_placeholder() {
        let rendered = render_prompt("A: {{context}}\nB: {{context}}", "x");
        assert_eq!(rendered, "A: x\nB: x");
    }

    #[test]
    fn test_render_with_empty_seed_context() {
        assert_eq!(render_prompt("Start. {{context}}", ""), "Start. ");
    }

    #[test]
    fn test_render_leaves_other_braces() {
        assert_eq!(render_prompt("{{name}} {\"k\": 1}", "ctx"), "{{name}} {\"k\": 1}");
    }

    #[test]
    fn test_first_attempt_has_no_feedback() {
        assert_eq!(inject_feedback("prompt", 1, Some("ignored")), "prompt");
    }

    #[test]
    fn test_retry_feedback_is_deterministic() {
        let first = inject_feedback("prompt", 2, Some("missing OK"));
        let second = inject_feedback("prompt", 2, Some("missing OK"));

        assert_eq!(first, second);
        assert!(first.starts_with("prompt\n\n---\n"));
        assert!(first.contains("Previous attempt failed: missing OK. Revise and retry."));
        assert!(first.ends_with("This is attempt 2."));
    }

    #[test]
    fn test_retry_without_reason_uses_generic_text() {
        let prompt = inject_feedback("prompt", 3, None);
        assert!(prompt.contains("output did not meet the completion criteria"));
    }
}
