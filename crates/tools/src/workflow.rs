//! Workflow tool — CRUD for DAG-based multi-step workflows.
//!
//! Lets the agent create, list, inspect, edit, and delete workflow
//! definitions stored as JSON in the workspace. Execution goes through the
//! workflow runner; this tool only manages definitions.

use async_trait::async_trait;
use tracing::info;

use talon_core::error::ToolError;
use talon_core::tool::{Tool, ToolContext, ToolResult};
use talon_workflow::{StepDef, WorkflowDef, WorkflowStore};

const MAX_STEPS: usize = 50;

/// Manage multi-step workflow definitions from the agent loop.
pub struct WorkflowTool;

#[async_trait]
impl Tool for WorkflowTool {
    fn name(&self) -> &str {
        "workflow"
    }

    fn description(&self) -> &str {
        "Create, list, inspect, edit, and delete DAG-based multi-step workflows. \
         Each workflow is a sequence of agent steps that can depend on each other \
         and reference prior step outputs via {{step_name.output}} templates."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "list", "show", "edit", "delete"],
                    "description": "Action to perform."
                },
                "workflow_name": {
                    "type": "string",
                    "description": "Name of the workflow (for create/show/edit/delete). Must be alphanumeric with underscores/hyphens only."
                },
                "description": {
                    "type": "string",
                    "description": "Workflow description (for create/edit)."
                },
                "steps": {
                    "type": "array",
                    "description": "Step definitions (for create/edit). Each step: name (required), prompt (required), profile (default: 'default'), depends_on (list of step names), timeout_seconds (default: 300).",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "prompt": {"type": "string"},
                            "profile": {"type": "string"},
                            "depends_on": {"type": "array", "items": {"type": "string"}},
                            "timeout_seconds": {"type": "integer"}
                        },
                        "required": ["name", "prompt"]
                    }
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let action = arguments["action"].as_str().unwrap_or("");
        let store = WorkflowStore::new(ctx.workspace_path.join("workflows"));

        let result = match action {
            "create" => create(&arguments, &store),
            "list" => list(&store),
            "show" => show(&arguments, &store),
            "edit" => edit(&arguments, &store),
            "delete" => delete(&arguments, &store),
            other => ToolResult::error(format!(
                "Error: unknown action '{other}'. Use: create, list, show, edit, delete."
            )),
        };
        Ok(result)
    }
}

fn parse_steps(raw: &serde_json::Value) -> Result<Vec<StepDef>, String> {
    let array = raw
        .as_array()
        .ok_or_else(|| "steps must be an array".to_string())?;
    if array.is_empty() {
        return Err("at least one step is required".into());
    }
    serde_json::from_value(raw.clone()).map_err(|e| e.to_string())
}

fn create(arguments: &serde_json::Value, store: &WorkflowStore) -> ToolResult {
    let name = arguments["workflow_name"].as_str().unwrap_or("").trim();
    if name.is_empty() {
        return ToolResult::error("Error: workflow_name is required for create action.");
    }

    if arguments.get("steps").is_none() {
        return ToolResult::error(
            "Error: steps array is required for create action (at least one step).",
        );
    }

    if store.load(name).is_some() {
        return ToolResult::error(format!(
            "Error: workflow '{name}' already exists. Use action 'edit' to update it, or 'delete' first."
        ));
    }

    let steps = match parse_steps(&arguments["steps"]) {
        Ok(steps) => steps,
        Err(e) => return ToolResult::error(format!("Error: invalid step definition: {e}")),
    };
    if steps.len() > MAX_STEPS {
        return ToolResult::error(format!("Error: workflow exceeds maximum of {MAX_STEPS} steps."));
    }

    let wf = WorkflowDef {
        name: name.to_string(),
        description: arguments["description"].as_str().unwrap_or("").to_string(),
        steps,
    };

    let errors = wf.validate();
    if !errors.is_empty() {
        let listing: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
        return ToolResult::error(format!(
            "Error: workflow validation failed:\n{}",
            listing.join("\n")
        ));
    }

    let path = match store.save(&wf) {
        Ok(path) => path,
        Err(e) => return ToolResult::error(format!("Error: {e}")),
    };
    let layers = wf.get_execution_order();
    info!(workflow = %name, steps = wf.steps.len(), "Agent created workflow");

    ToolResult::ok(format!(
        "Workflow '{name}' created successfully.\n  Steps: {}\n  Execution layers: {}\n  Saved to: {}\n  Run with: talon workflow run {name}",
        wf.steps.len(),
        layers.len(),
        path.display()
    ))
}

fn list(store: &WorkflowStore) -> ToolResult {
    let names = store.list();
    if names.is_empty() {
        return ToolResult::ok("No workflows found.");
    }

    let mut lines = vec!["## Saved Workflows\n".to_string()];
    for name in names {
        match store.load(&name) {
            Some(wf) => {
                let layers = wf.get_execution_order();
                let description = if wf.description.is_empty() {
                    String::new()
                } else {
                    format!(" — {}", wf.description)
                };
                lines.push(format!(
                    "- **{name}**: {} steps, {} layers{description}",
                    wf.steps.len(),
                    layers.len()
                ));
            }
            None => lines.push(format!("- **{name}**: (failed to load)")),
        }
    }
    ToolResult::ok(lines.join("\n"))
}

fn show(arguments: &serde_json::Value, store: &WorkflowStore) -> ToolResult {
    let name = arguments["workflow_name"].as_str().unwrap_or("").trim();
    if name.is_empty() {
        return ToolResult::error("Error: workflow_name is required for show action.");
    }

    let Some(wf) = store.load(name) else {
        return ToolResult::error(format!("Error: workflow '{name}' not found."));
    };

    let layers = wf.get_execution_order();
    let errors = wf.validate();

    let mut lines = vec![
        format!("## Workflow: {}", wf.name),
        format!(
            "Description: {}",
            if wf.description.is_empty() { "(none)" } else { &wf.description }
        ),
        format!("Steps: {}", wf.steps.len()),
        format!("Execution layers: {}", layers.len()),
        String::new(),
        "### Steps".to_string(),
    ];

    for step in &wf.steps {
        let deps = if step.depends_on.is_empty() {
            "(none)".to_string()
        } else {
            step.depends_on.join(", ")
        };
        let prompt_preview: String = step.prompt.chars().take(200).collect();
        let ellipsis = if step.prompt.chars().count() > 200 { "..." } else { "" };
        lines.push(format!(
            "- **{}** [profile: {}, timeout: {}s]\n  Dependencies: {deps}\n  Prompt: {prompt_preview}{ellipsis}",
            step.name, step.profile, step.timeout_seconds
        ));
    }

    lines.push(String::new());
    lines.push("### Execution Order".to_string());
    for (i, layer) in layers.iter().enumerate() {
        lines.push(format!("  Layer {}: {}", i + 1, layer.join(", ")));
    }

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("### Validation Errors".to_string());
        for err in errors {
            lines.push(format!("  - {err}"));
        }
    }

    ToolResult::ok(lines.join("\n"))
}

fn edit(arguments: &serde_json::Value, store: &WorkflowStore) -> ToolResult {
    let name = arguments["workflow_name"].as_str().unwrap_or("").trim();
    if name.is_empty() {
        return ToolResult::error("Error: workflow_name is required for edit action.");
    }

    let Some(existing) = store.load(name) else {
        return ToolResult::error(format!(
            "Error: workflow '{name}' not found. Use action 'create' to create a new workflow."
        ));
    };

    if arguments.get("steps").is_none() {
        return ToolResult::error("Error: steps array is required for edit action.");
    }
    let steps = match parse_steps(&arguments["steps"]) {
        Ok(steps) => steps,
        Err(e) => return ToolResult::error(format!("Error: invalid step definition: {e}")),
    };
    if steps.len() > MAX_STEPS {
        return ToolResult::error(format!("Error: workflow exceeds maximum of {MAX_STEPS} steps."));
    }

    let wf = WorkflowDef {
        name: name.to_string(),
        description: arguments["description"]
            .as_str()
            .map(str::to_string)
            .unwrap_or(existing.description),
        steps,
    };

    let errors = wf.validate();
    if !errors.is_empty() {
        let listing: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
        return ToolResult::error(format!(
            "Error: workflow validation failed:\n{}",
            listing.join("\n")
        ));
    }

    let path = match store.save(&wf) {
        Ok(path) => path,
        Err(e) => return ToolResult::error(format!("Error: {e}")),
    };
    let layers = wf.get_execution_order();
    info!(workflow = %name, steps = wf.steps.len(), "Agent updated workflow");

    ToolResult::ok(format!(
        "Workflow '{name}' updated successfully.\n  Steps: {}\n  Execution layers: {}\n  Saved to: {}",
        wf.steps.len(),
        layers.len(),
        path.display()
    ))
}

fn delete(arguments: &serde_json::Value, store: &WorkflowStore) -> ToolResult {
    let name = arguments["workflow_name"].as_str().unwrap_or("").trim();
    if name.is_empty() {
        return ToolResult::error("Error: workflow_name is required for delete action.");
    }

    if store.delete(name) {
        info!(workflow = %name, "Agent deleted workflow");
        ToolResult::ok(format!("Workflow '{name}' deleted."))
    } else {
        ToolResult::error(format!("Error: workflow '{name}' not found."))
    }
}
