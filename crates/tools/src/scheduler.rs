//! Scheduler tool — natural language cron job management.
//!
//! Converts phrases like "every day at 9am" into cron expressions and
//! maintains `cron/jobs.json` in the workspace. Legacy per-job files are
//! migrated before every action, so the tool can be pointed at an old
//! workspace without a separate upgrade step.

use async_trait::async_trait;
use tracing::info;

use talon_core::error::ToolError;
use talon_core::session::split_reply_to;
use talon_core::tool::{Tool, ToolContext, ToolResult};
use talon_scheduler::{CronExpr, CronJob, load_jobs, migrate_legacy_files, parse_phrase, save_jobs};

/// Natural language cron scheduling: create, list, and delete jobs.
pub struct SchedulerTool;

#[async_trait]
impl Tool for SchedulerTool {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn description(&self) -> &str {
        "Manage scheduled tasks with natural language ('every day at 9am') or cron expressions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "list", "delete"],
                    "description": "Action to perform."
                },
                "schedule": {
                    "type": "string",
                    "description": "Natural language or cron expression (for create action)."
                },
                "task_name": {
                    "type": "string",
                    "description": "Name/description of the scheduled task (for create action)."
                },
                "command": {
                    "type": "string",
                    "description": "Prompt to run on schedule (for create action)."
                },
                "reply_to": {
                    "type": "string",
                    "description": "Session key to deliver results to (e.g. 'telegram:12345'). Required for channel delivery."
                },
                "task_id": {
                    "type": "string",
                    "description": "Task ID to delete (for delete action)."
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
        let cron_dir = ctx.workspace_path.join("cron");
        std::fs::create_dir_all(&cron_dir).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "scheduler".into(),
            reason: format!("create {}: {e}", cron_dir.display()),
        })?;

        migrate_legacy_files(&cron_dir);

        let result = match action {
            "create" => create(&arguments, &cron_dir),
            "list" => list(&cron_dir),
            "delete" => delete(&arguments, &cron_dir),
            other => ToolResult::error(format!(
                "Error: unknown action '{other}'. Use: create, list, delete."
            )),
        };
        Ok(result)
    }
}

fn create(arguments: &serde_json::Value, cron_dir: &std::path::Path) -> ToolResult {
    let schedule = arguments["schedule"].as_str().unwrap_or("");
    let task_name = arguments["task_name"].as_str().unwrap_or("Unnamed task");
    let command = arguments["command"].as_str().unwrap_or("");
    let reply_to = arguments["reply_to"].as_str().unwrap_or("");

    if schedule.is_empty() {
        return ToolResult::error("Error: schedule is required for create action.");
    }

    if !reply_to.is_empty() && split_reply_to(reply_to).is_none() {
        return ToolResult::error(format!(
            "Error: invalid reply_to format '{reply_to}'. Expected 'channel:chat_id' (e.g. 'telegram:12345')."
        ));
    }

    let Some(cron_expr) = parse_phrase(schedule) else {
        return ToolResult::error(format!(
            "Error: could not parse schedule '{schedule}'. Try formats like: 'every 5 minutes', \
             'every day at 9am', 'every Monday at 3pm', or a raw cron expression like '*/5 * * * *'."
        ));
    };
    if let Err(reason) = CronExpr::parse(&cron_expr) {
        return ToolResult::error(format!(
            "Error: schedule '{schedule}' produced invalid cron '{cron_expr}': {reason}"
        ));
    }

    let job = CronJob::new(task_name, &cron_expr, command, reply_to);
    let task_id = job.id.clone();

    let mut jobs = load_jobs(cron_dir);
    jobs.push(job);
    if let Err(e) = save_jobs(cron_dir, &jobs) {
        return ToolResult::error(format!("Error: failed to save job: {e}"));
    }

    info!(task_id = %task_id, schedule = %cron_expr, "Agent created scheduled task");

    let mut text = format!(
        "Scheduled task created:\n  ID: {task_id}\n  Name: {task_name}\n  Cron: {cron_expr}\n  Schedule: {schedule}\n  Prompt: {command}"
    );
    if !reply_to.is_empty() {
        text.push_str(&format!("\n  Reply to: {reply_to}"));
    }
    ToolResult::ok(text)
}

fn list(cron_dir: &std::path::Path) -> ToolResult {
    let jobs = load_jobs(cron_dir);
    if jobs.is_empty() {
        return ToolResult::ok("No scheduled tasks found.");
    }

    let mut lines = vec!["## Scheduled Tasks\n".to_string()];
    for job in jobs {
        let enabled = if job.enabled { "enabled" } else { "disabled" };
        lines.push(format!(
            "- **{}** (ID: {}) [{enabled}]\n  Schedule: `{}` | Prompt: {}",
            job.name, job.id, job.schedule, job.prompt
        ));
    }
    ToolResult::ok(lines.join("\n"))
}

fn delete(arguments: &serde_json::Value, cron_dir: &std::path::Path) -> ToolResult {
    let task_id = arguments["task_id"].as_str().unwrap_or("");
    if task_id.is_empty() {
        return ToolResult::error("Error: task_id is required for delete action.");
    }

    let jobs = load_jobs(cron_dir);
    let filtered: Vec<CronJob> = jobs.iter().filter(|j| j.id != task_id).cloned().collect();

    if filtered.len() == jobs.len() {
        return ToolResult::error(format!("Error: no scheduled task found with ID '{task_id}'."));
    }

    if let Err(e) = save_jobs(cron_dir, &filtered) {
        return ToolResult::error(format!("Error: failed to save jobs: {e}"));
    }
    info!(task_id = %task_id, "Agent deleted scheduled task");
    ToolResult::ok(format!("Deleted scheduled task: {task_id}"))
}
