//! Layer-parallel workflow execution.
//!
//! The runner executes one validated [`WorkflowDef`] to completion: layers
//! from Kahn ordering run one after another (a barrier between layers), the
//! steps inside a layer run concurrently. A step whose dependency failed or
//! was skipped never launches; everything else gets its prompt templates
//! resolved and an engine call under the step's own deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use talon_core::engine::AgentEngine;
use talon_core::error::WorkflowError;
use talon_core::session::SessionKey;
use talon_telemetry::RuntimeMetrics;

use crate::model::{StepDef, StepResult, StepStatus, WorkflowDef, WorkflowRunResult, WorkflowStatus};
use crate::template::resolve_templates;

/// Executes workflow definitions against an agent engine.
pub struct WorkflowRunner {
    engine: Arc<dyn AgentEngine>,
    metrics: Arc<RuntimeMetrics>,
}

impl WorkflowRunner {
    pub fn new(engine: Arc<dyn AgentEngine>, metrics: Arc<RuntimeMetrics>) -> Self {
        Self { engine, metrics }
    }

    /// Run a workflow to completion.
    ///
    /// Step failures and timeouts are recorded in the result, never
    /// returned as errors; only an invalid definition fails the call.
    pub async fn run(&self, def: &WorkflowDef) -> Result<WorkflowRunResult, WorkflowError> {
        let errors = def.validate();
        if !errors.is_empty() {
            return Err(WorkflowError::InvalidDefinition {
                name: def.name.clone(),
                errors,
            });
        }

        let layers = def.get_execution_order();
        let steps_by_name: HashMap<&str, &StepDef> =
            def.steps.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut result = WorkflowRunResult::new(&def.name);
        result.status = WorkflowStatus::Running;
        result.started_at = Some(Utc::now());
        for step in &def.steps {
            result
                .step_results
                .insert(step.name.clone(), StepResult::new(&step.name));
        }

        info!(
            workflow = %def.name,
            steps = def.steps.len(),
            layers = layers.len(),
            "Workflow run started"
        );

        for layer in &layers {
            let mut launches: Vec<(StepDef, String)> = Vec::new();

            for step_name in layer {
                let Some(step) = steps_by_name.get(step_name.as_str()) else {
                    continue;
                };

                // A step whose dependency did not succeed never runs.
                let failed_dep = step.depends_on.iter().find(|dep| {
                    result
                        .step_results
                        .get(dep.as_str())
                        .is_some_and(|r| {
                            matches!(r.status, StepStatus::Failed | StepStatus::Skipped)
                        })
                });

                if let Some(dep) = failed_dep {
                    debug!(workflow = %def.name, step = %step_name, dep = %dep, "Skipping step");
                    if let Some(r) = result.step_results.get_mut(step_name) {
                        r.mark_skipped(format!("dependency {dep} did not succeed"));
                    }
                    continue;
                }

                let prompt = resolve_templates(&step.prompt, &result.step_results);
                launches.push(((*step).clone(), prompt));
            }

            // Barrier: the layer finishes when every launched step settles.
            let settled = join_all(
                launches
                    .into_iter()
                    .map(|(step, prompt)| self.run_step(step, prompt, &def.name)),
            )
            .await;

            for step_result in settled {
                result
                    .step_results
                    .insert(step_result.name.clone(), step_result);
            }
        }

        let completed_at = Utc::now();
        result.completed_at = Some(completed_at);
        if let Some(started) = result.started_at {
            result.total_duration_seconds =
                completed_at.signed_duration_since(started).num_milliseconds().max(0) as f64
                    / 1000.0;
        }
        result.status = if result.all_completed() {
            WorkflowStatus::Completed
        } else if result.has_failures() {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Partial
        };

        self.metrics.workflow_runs.incr();
        if result.status == WorkflowStatus::Failed {
            self.metrics.workflow_failures.incr();
        }
        self.metrics
            .workflow_duration_seconds
            .observe(result.total_duration_seconds);

        info!(
            workflow = %def.name,
            status = %result.status,
            duration_seconds = result.total_duration_seconds,
            "Workflow run finished"
        );

        Ok(result)
    }

    async fn run_step(&self, step: StepDef, prompt: String, workflow: &str) -> StepResult {
        let mut step_result = StepResult::new(&step.name);
        step_result.mark_running();

        let session_key = SessionKey::for_workflow_step(workflow, &step.name);
        debug!(
            workflow = %workflow,
            step = %step.name,
            profile = %step.profile,
            timeout_seconds = step.timeout_seconds,
            "Step started"
        );

        let deadline = Duration::from_secs(step.timeout_seconds);
        let call = self.engine.run(&prompt, session_key.as_str(), &step.profile);

        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(run)) => {
                step_result.mark_completed(run.response, run.iterations);
            }
            Ok(Err(e)) => {
                warn!(workflow = %workflow, step = %step.name, error = %e, "Step failed");
                step_result.mark_failed(e.to_string());
            }
            Err(_) => {
                warn!(
                    workflow = %workflow,
                    step = %step.name,
                    timeout_seconds = step.timeout_seconds,
                    "Step timed out"
                );
                step_result.mark_failed(format!("Timed out after {}s", step.timeout_seconds));
            }
        }

        step_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use talon_core::engine::RunResult;
    use talon_core::error::EngineError;

    /// Engine double: replies "ok-<step>" and records every call.
    struct FakeEngine {
        fail_steps: HashSet<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeEngine {
        fn new() -> Self {
            Self {
                fail_steps: HashSet::new(),
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(steps: &[&str]) -> Self {
            let mut engine = Self::new();
            engine.fail_steps = steps.iter().map(|s| s.to_string()).collect();
            engine
        }

        fn sleeping(delay: Duration) -> Self {
            let mut engine = Self::new();
            engine.delay = Some(delay);
            engine
        }

        fn prompt_for(&self, step: &str) -> Option<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|(key, _)| key.ends_with(&format!(":{step}")))
                .map(|(_, prompt)| prompt.clone())
        }
    }

    #[async_trait]
    impl AgentEngine for FakeEngine {
        async fn run(
            &self,
            prompt: &str,
            session_key: &str,
            _profile: &str,
        ) -> Result<RunResult, EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push((session_key.to_string(), prompt.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let step = session_key.rsplit(':').next().unwrap_or("");
            if self.fail_steps.contains(step) {
                return Err(EngineError::Failed("engine exploded".into()));
            }
            Ok(RunResult {
                response: format!("ok-{step}"),
                iterations: 1,
                total_tokens: 42,
            })
        }
    }

    fn step(name: &str, prompt: &str, deps: &[&str]) -> StepDef {
        StepDef {
            name: name.into(),
            prompt: prompt.into(),
            profile: "default".into(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            timeout_seconds: 300,
        }
    }

    fn workflow(name: &str, steps: Vec<StepDef>) -> WorkflowDef {
        WorkflowDef {
            name: name.into(),
            description: String::new(),
            steps,
        }
    }

    fn runner(engine: Arc<FakeEngine>) -> (WorkflowRunner, Arc<RuntimeMetrics>) {
        let metrics = Arc::new(RuntimeMetrics::new());
        (WorkflowRunner::new(engine, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn parallel_then_join() {
        let engine = Arc::new(FakeEngine::new());
        let (runner, _) = runner(engine.clone());

        let wf = workflow(
            "join",
            vec![
                step("a", "A", &[]),
                step("b", "B", &[]),
                step("c", "C from {{a.output}}", &["a", "b"]),
            ],
        );
        assert_eq!(wf.get_execution_order().len(), 2);

        let result = runner.run(&wf).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results["c"].output, "ok-c");

        let c_prompt = engine.prompt_for("c").unwrap();
        assert!(c_prompt.contains("[output from a]\nok-a\n[/output from a]"));
        assert!(!c_prompt.contains("{{a.output}}"));
    }

    #[tokio::test]
    async fn failure_propagation() {
        let engine = Arc::new(FakeEngine::failing_on(&["a"]));
        let (runner, metrics) = runner(engine.clone());

        let wf = workflow(
            "fanout",
            vec![
                step("a", "A", &[]),
                step("b", "B", &[]),
                step("c", "C", &["a"]),
                step("d", "D", &["b"]),
            ],
        );

        let result = runner.run(&wf).await.unwrap();
        assert_eq!(result.step_results["a"].status, StepStatus::Failed);
        assert_eq!(result.step_results["b"].status, StepStatus::Completed);
        assert_eq!(result.step_results["c"].status, StepStatus::Skipped);
        assert_eq!(result.step_results["d"].status, StepStatus::Completed);
        assert_eq!(result.status, WorkflowStatus::Failed);

        assert_eq!(
            result.step_results["c"].error,
            "dependency a did not succeed"
        );
        // c was never launched
        assert!(engine.prompt_for("c").is_none());
        assert_eq!(metrics.workflow_failures.get(), 1);
    }

    #[tokio::test]
    async fn skip_cascades_through_layers() {
        let engine = Arc::new(FakeEngine::failing_on(&["a"]));
        let (runner, _) = runner(engine.clone());

        let wf = workflow(
            "chain",
            vec![
                step("a", "A", &[]),
                step("c", "C", &["a"]),
                step("e", "E", &["c"]),
            ],
        );

        let result = runner.run(&wf).await.unwrap();
        assert_eq!(result.step_results["c"].status, StepStatus::Skipped);
        assert_eq!(result.step_results["e"].status, StepStatus::Skipped);
        assert!(result.step_results["e"].error.contains("dependency c"));
        assert_eq!(result.status, WorkflowStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn step_timeout_marks_failed() {
        let engine = Arc::new(FakeEngine::sleeping(Duration::from_secs(10)));
        let (runner, _) = runner(engine.clone());

        let mut slow = step("slow", "take your time", &[]);
        slow.timeout_seconds = 1;
        let wf = workflow("deadline", vec![slow]);

        let result = runner.run(&wf).await.unwrap();
        assert_eq!(result.step_results["slow"].status, StepStatus::Failed);
        assert!(result.step_results["slow"].error.contains("Timed out after 1s"));
        assert_eq!(result.status, WorkflowStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_does_not_stop_siblings() {
        let engine = Arc::new(FakeEngine::sleeping(Duration::from_secs(2)));
        let (runner, _) = runner(engine.clone());

        let mut slow = step("slow", "slow", &[]);
        slow.timeout_seconds = 1;
        let mut fast = step("fast", "fast", &[]);
        fast.timeout_seconds = 30;
        let wf = workflow("mixed", vec![fast, slow]);

        let result = runner.run(&wf).await.unwrap();
        assert_eq!(result.step_results["slow"].status, StepStatus::Failed);
        assert_eq!(result.step_results["fast"].status, StepStatus::Completed);
        assert_eq!(result.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn session_keys_are_per_step() {
        let engine = Arc::new(FakeEngine::new());
        let (runner, _) = runner(engine.clone());

        let wf = workflow("keys", vec![step("a", "A", &[]), step("b", "B", &["a"])]);
        runner.run(&wf).await.unwrap();

        let calls = engine.calls.lock().unwrap();
        let keys: Vec<&str> = calls.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"workflow:keys:a"));
        assert!(keys.contains(&"workflow:keys:b"));
    }

    #[tokio::test]
    async fn invalid_definition_is_rejected() {
        let engine = Arc::new(FakeEngine::new());
        let (runner, metrics) = runner(engine.clone());

        let wf = workflow("bad", vec![step("a", "A", &["a"])]);
        let err = runner.run(&wf).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDefinition { .. }));
        // No engine calls, no metrics.
        assert!(engine.calls.lock().unwrap().is_empty());
        assert_eq!(metrics.workflow_runs.get(), 0);
    }

    #[tokio::test]
    async fn metrics_sampled_on_success() {
        let engine = Arc::new(FakeEngine::new());
        let (runner, metrics) = runner(engine.clone());

        let wf = workflow("ok", vec![step("a", "A", &[])]);
        runner.run(&wf).await.unwrap();

        assert_eq!(metrics.workflow_runs.get(), 1);
        assert_eq!(metrics.workflow_failures.get(), 0);
        assert_eq!(metrics.workflow_duration_seconds.count(), 1);
    }

    #[tokio::test]
    async fn unresolved_template_reaches_engine_verbatim() {
        let engine = Arc::new(FakeEngine::new());
        let (runner, _) = runner(engine.clone());

        // "b" runs in the same layer as "a", so a's output is not yet
        // available when b's prompt is resolved.
        let wf = workflow(
            "sibling",
            vec![step("a", "A", &[]), step("b", "B uses {{a.output}}", &[])],
        );
        let result = runner.run(&wf).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Completed);

        let b_prompt = engine.prompt_for("b").unwrap();
        assert!(b_prompt.contains("{{a.output}}"));
    }

    #[tokio::test]
    async fn step_output_placeholders_never_resubstituted() {
        // Step a's raw output contains a placeholder aimed at b's output.
        struct TrickyEngine {
            calls: Mutex<Vec<(String, String)>>,
        }

        #[async_trait]
        impl AgentEngine for TrickyEngine {
            async fn run(
                &self,
                prompt: &str,
                session_key: &str,
                _profile: &str,
            ) -> Result<RunResult, EngineError> {
                self.calls
                    .lock()
                    .unwrap()
                    .push((session_key.to_string(), prompt.to_string()));
                let step = session_key.rsplit(':').next().unwrap_or("");
                let response = match step {
                    "a" => "injected {{b.output}} ha".to_string(),
                    _ => format!("ok-{step}"),
                };
                Ok(RunResult {
                    response,
                    iterations: 1,
                    total_tokens: 1,
                })
            }
        }

        let engine = Arc::new(TrickyEngine {
            calls: Mutex::new(Vec::new()),
        });
        let metrics = Arc::new(RuntimeMetrics::new());
        let runner = WorkflowRunner::new(engine.clone(), metrics);

        let wf = workflow(
            "inject",
            vec![
                step("a", "A", &[]),
                step("b", "B", &[]),
                step("c", "C from {{a.output}}", &["a", "b"]),
            ],
        );
        let result = runner.run(&wf).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Completed);

        // The raw output byte sequence containing a placeholder must not
        // survive into any later prompt.
        let a_output = result.step_results["a"].output.clone();
        assert!(a_output.contains("{{b.output}}"));

        let calls = engine.calls.lock().unwrap();
        let (_, c_prompt) = calls
            .iter()
            .find(|(key, _)| key.ends_with(":c"))
            .expect("c was launched");
        assert!(!c_prompt.contains(&a_output));
        assert!(!c_prompt.contains("{{b.output}}"));
        assert!(c_prompt.contains("[template-ref-removed]"));
    }
}
