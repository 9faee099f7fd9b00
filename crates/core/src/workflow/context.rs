//! Derivation of the context handed from one step to the next.

use crate::types::ContextMode;

const FENCE: &str = "```";

/// Default bound for `summary` mode, in characters.
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 500;

/// Pure transformer from a step's raw output to the next step's input context
#[derive(Debug, Clone, Copy)]
pub struct ContextTransformer {
    summary_max_chars: usize,
}

impl ContextTransformer {
    pub fn new(summary_max_chars: usize) -> Self {
        Self { summary_max_chars }
    }

    /// Transform `output` according to `mode`
    pub fn transform(&self, output: &str, mode: ContextMode) -> String {
        match mode {
            ContextMode::Full => output.to_string(),
            ContextMode::CodeOnly => first_code_block(output).unwrap_or_default().to_string(),
            ContextMode::JsonOnly => first_json_value(output)
                .map(|value| value.to_string())
                .unwrap_or_default(),
            ContextMode::Summary => summarize(output, self.summary_max_chars),
        }
    }
}

impl Default for ContextTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_MAX_CHARS)
    }
}

/// Body of the first fenced code block, without the fence lines or info string.
pub fn first_code_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];

    let body_start = match after_open.find('\n') {
        Some(newline) => {
            // ```inline``` on a single line
            if let Some(close) = after_open[..newline].find(FENCE) {
                return Some(&after_open[..close]);
            }
            newline + 1
        }
        None => {
            let close = after_open.find(FENCE)?;
            return Some(&after_open[..close]);
        }
    };

    let body = &after_open[body_start..];
    let close = body.find(FENCE)?;
    Some(&body[..close])
}

/// Characters scanned per input character before the search gives up. Keeps
/// text full of unclosed brackets from costing quadratic time.
const JSON_SCAN_BUDGET: usize = 64;

/// First balanced JSON object or array embedded in `text` that parses.
pub fn first_json_value(text: &str) -> Option<serde_json::Value> {
    let mut budget = text.len().saturating_mul(JSON_SCAN_BUDGET);

    for (start, ch) in text.char_indices() {
        if !matches!(ch, '{' | '[') {
            continue;
        }
        if budget == 0 {
            tracing::debug!(len = text.len(), "Gave up looking for JSON in output");
            return None;
        }
        let Some(end) = balanced_end(text, start, &mut budget) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str(&text[start..end]) {
            return Some(value);
        }
        budget = budget.saturating_sub(end - start);
    }

    None
}

/// Byte offset one past the bracket closing the one at `start`, skipping
/// brackets inside string literals. Every character visited is charged to
/// `budget`; `None` once it runs out.
fn balanced_end(text: &str, start: usize, budget: &mut usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        *budget = budget.checked_sub(1)?;

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Extractive summary: whitespace is collapsed and whole sentences are kept
/// from the start while they fit in `max_chars`. A leading sentence that is
/// longer than the bound on its own is cut and marked with an ellipsis, so the
/// result never exceeds `max_chars + 1` characters.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let mut summary = String::new();
    let mut len = 0;
    for sentence in sentences(&collapsed) {
        let sentence_len = sentence.chars().count();
        let separator = usize::from(!summary.is_empty());
        if len + separator + sentence_len > max_chars {
            break;
        }
        if separator == 1 {
            summary.push(' ');
        }
        summary.push_str(sentence);
        len += separator + sentence_len;
    }

    if summary.is_empty() {
        let cut: String = collapsed.chars().take(max_chars).collect();
        return format!("{}…", cut.trim_end());
    }

    summary
}

fn sentences(collapsed: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut after_terminator = false;

    for (i, ch) in collapsed.char_indices() {
        if ch == ' ' && after_terminator {
            out.push(&collapsed[start..i]);
            start = i + 1;
        }
        after_terminator = matches!(ch, '.' | '!' | '?');
    }
    if start < collapsed.len() {
        out.push(&collapsed[start..]);
    }

    out
}
