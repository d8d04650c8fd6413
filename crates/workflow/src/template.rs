//! Prompt templating: `{{step_name.output}}` placeholder resolution.
//!
//! Substituted output is wrapped in `[output from NAME]` delimiters and
//! truncated. Any `{{...}}` sequence found inside a step's raw output is
//! neutralised before substitution, so text produced by one step can never
//! smuggle a placeholder into a later prompt. Resolution is a single pass:
//! substituted text is not re-scanned.

use regex_lite::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::model::{StepResult, StepStatus};

/// Longest step output that will be inlined into a downstream prompt.
pub const MAX_TEMPLATE_OUTPUT_LENGTH: usize = 10_000;

/// Marker left where output text tried to look like a placeholder.
const TEMPLATE_REF_REMOVED: &str = "[template-ref-removed]";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_-]+)\.output\}\}").expect("placeholder pattern is valid")
});

static ANY_TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("template pattern is valid"));

/// Resolve placeholders in `prompt` from completed step results.
///
/// Placeholders whose referenced step is missing or not yet `completed` are
/// left verbatim; the runner decides how to handle unresolved templates.
pub fn resolve_templates(prompt: &str, results: &BTreeMap<String, StepResult>) -> String {
    PLACEHOLDER
        .replace_all(prompt, |caps: &Captures<'_>| {
            let name = &caps[1];
            match results.get(name) {
                Some(r) if r.status == StepStatus::Completed => {
                    let sanitized = ANY_TEMPLATE.replace_all(&r.output, TEMPLATE_REF_REMOVED);
                    let rendered = truncate_output(&sanitized);
                    format!("[output from {name}]\n{rendered}\n[/output from {name}]")
                }
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn truncate_output(output: &str) -> String {
    if output.chars().count() <= MAX_TEMPLATE_OUTPUT_LENGTH {
        return output.to_string();
    }
    let head: String = output.chars().take(MAX_TEMPLATE_OUTPUT_LENGTH).collect();
    format!("{head}... [truncated]")
}
