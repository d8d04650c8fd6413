//! Workflow data model: definitions, steps, and execution results.
//!
//! Definitions are validated at load time and immutable afterwards; the
//! runner owns one [`WorkflowRunResult`] per run and is its only mutator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Lifecycle states for a workflow step.
///
/// `pending → running → {completed | failed}`, or `pending → skipped` when a
/// dependency did not succeed. `completed`, `failed`, and `skipped` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Definition of a single workflow step.
///
/// `depends_on` lists step names that must complete before this step runs.
/// `prompt` can contain `{{step_name.output}}` placeholders that are
/// resolved at execution time from prior step results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub name: String,

    pub prompt: String,

    /// Opaque engine configuration selector.
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_profile() -> String {
    "default".into()
}

fn default_timeout_seconds() -> u64 {
    300
}

fn valid_step_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Execution result of a single workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub output: String,
    pub error: String,
    pub iterations: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
}

impl StepResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            output: String::new(),
            error: String::new(),
            iterations: 0,
            started_at: None,
            completed_at: None,
            duration_seconds: 0.0,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, output: String, iterations: u32) {
        self.status = StepStatus::Completed;
        self.output = output;
        self.iterations = iterations;
        self.set_completed_time();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = error.into();
        self.set_completed_time();
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Skipped;
        self.error = reason.into();
        self.set_completed_time();
    }

    fn set_completed_time(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if let Some(start) = self.started_at {
            self.duration_seconds =
                now.signed_duration_since(start).num_milliseconds().max(0) as f64 / 1000.0;
        }
    }
}

/// Complete workflow definition: a named DAG of steps.
///
/// Steps are validated to ensure:
///   - Non-empty workflow name
///   - At least one step
///   - Valid step names (alphanumeric, underscore, hyphen)
///   - Positive timeout values
///   - No duplicate step names
///   - All `depends_on` references point to existing steps
///   - No circular dependencies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub steps: Vec<StepDef>,
}

impl WorkflowDef {
    /// Return a list of validation errors (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors: Vec<String> = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Workflow name cannot be empty".into());
        }

        if self.steps.is_empty() {
            errors.push("Workflow must have at least one step".into());
            return errors;
        }

        let names: HashSet<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();

        for step in &self.steps {
            if !valid_step_name(&step.name) {
                errors.push(format!(
                    "Step name '{}' is invalid (must be non-empty, only alphanumeric/underscore/hyphen)",
                    step.name
                ));
            }
            if step.prompt.trim().is_empty() {
                errors.push(format!("Step '{}' has an empty prompt", step.name));
            }
            if step.timeout_seconds < 1 {
                errors.push(format!(
                    "Step '{}' has invalid timeout ({}s); must be >= 1",
                    step.name, step.timeout_seconds
                ));
            }
        }

        if names.len() != self.steps.len() {
            errors.push("Duplicate step names found".into());
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !names.contains(dep.as_str()) {
                    errors.push(format!(
                        "Step '{}' depends on unknown step '{dep}'",
                        step.name
                    ));
                }
            }
        }

        if errors.is_empty() {
            let layers = self.get_execution_order();
            let total_in_layers: usize = layers.iter().map(Vec::len).sum();
            if total_in_layers != self.steps.len() {
                errors.push("Circular dependency detected in workflow steps".into());
            }
        }

        errors
    }

    /// Return steps grouped into parallel execution layers.
    ///
    /// Each layer contains steps whose dependencies are all in earlier
    /// layers, so they can execute concurrently. Layers are sorted
    /// lexicographically for reproducible scheduling. Steps trapped in a
    /// cycle appear in no layer.
    pub fn get_execution_order(&self) -> Vec<Vec<String>> {
        let mut adj: HashMap<&str, Vec<&str>> = self
            .steps
            .iter()
            .map(|s| (s.name.as_str(), Vec::new()))
            .collect();
        let mut in_degree: HashMap<&str, usize> =
            self.steps.iter().map(|s| (s.name.as_str(), 0)).collect();

        for step in &self.steps {
            for dep in &step.depends_on {
                if let Some(successors) = adj.get_mut(dep.as_str()) {
                    successors.push(step.name.as_str());
                    if let Some(degree) = in_degree.get_mut(step.name.as_str()) {
                        *degree += 1;
                    }
                }
            }
        }

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut frontier: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();

        while !frontier.is_empty() {
            frontier.sort_unstable();
            layers.push(frontier.iter().map(|s| s.to_string()).collect());

            let mut next: Vec<&str> = Vec::new();
            for node in &frontier {
                for neighbor in &adj[node] {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(neighbor);
                        }
                    }
                }
            }
            frontier = next;
        }

        layers
    }
}

/// Overall status of a workflow run.
///
/// `completed` iff every step completed; `failed` if any step failed;
/// `partial` when steps were skipped without any failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        };
        write!(f, "{s}")
    }
}

const RESULT_OUTPUT_LIMIT: usize = 500;

/// Complete result of a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub workflow_name: String,
    pub status: WorkflowStatus,
    pub step_results: BTreeMap<String, StepResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration_seconds: f64,
}

impl WorkflowRunResult {
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            status: WorkflowStatus::Pending,
            step_results: BTreeMap::new(),
            started_at: None,
            completed_at: None,
            total_duration_seconds: 0.0,
        }
    }

    pub fn all_completed(&self) -> bool {
        self.step_results
            .values()
            .all(|r| r.status == StepStatus::Completed)
    }

    pub fn has_failures(&self) -> bool {
        self.step_results
            .values()
            .any(|r| r.status == StepStatus::Failed)
    }

    /// Render a summary with step outputs truncated for display.
    pub fn to_json(&self) -> serde_json::Value {
        let steps: serde_json::Map<String, serde_json::Value> = self
            .step_results
            .iter()
            .map(|(name, r)| {
                let output = if r.output.chars().count() > RESULT_OUTPUT_LIMIT {
                    let head: String = r.output.chars().take(RESULT_OUTPUT_LIMIT).collect();
                    format!("{head}... [truncated]")
                } else {
                    r.output.clone()
                };
                (
                    name.clone(),
                    serde_json::json!({
                        "status": r.status.to_string(),
                        "output": output,
                        "error": r.error,
                        "iterations": r.iterations,
                        "duration_seconds": r.duration_seconds,
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "workflow_name": self.workflow_name,
            "status": self.status.to_string(),
            "started_at": self.started_at,
            "completed_at": self.completed_at,
            "total_duration_seconds": self.total_duration_seconds,
            "steps": steps,
        })
    }
}
