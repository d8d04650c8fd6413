//! Shell execution tool.
//!
//! Commands pass through the deny filter before touching the OS, run with
//! the workspace as working directory under a configurable timeout, and
//! come back with `[stderr]` and `[exit code]` sections. Long output is
//! truncated in the middle so both the head and the tail survive.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use talon_core::error::ToolError;
use talon_core::tool::{Tool, ToolContext, ToolResult};
use talon_security::check_command;

const OUTPUT_LIMIT: usize = 50_000;

/// Execute shell commands with safety constraints.
pub struct ExecTool {
    default_timeout_seconds: u64,
}

impl ExecTool {
    pub fn new(default_timeout_seconds: u64) -> Self {
        Self {
            default_timeout_seconds,
        }
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout/stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds. Defaults to the configured shell timeout."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let timeout = arguments["timeout"]
            .as_u64()
            .unwrap_or(self.default_timeout_seconds);

        if let Some(reason) = check_command(command) {
            warn!(command = %command, reason = %reason, "Blocked dangerous command");
            return Ok(ToolResult::error(format!("Error: {reason}")));
        }

        debug!(command = %command, timeout_seconds = timeout, cwd = %ctx.workspace_path.display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&ctx.workspace_path).kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout), cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(ToolResult::error(format!(
                    "Error: OS error executing command: {e}"
                )));
            }
            Err(_) => {
                warn!(command = %command, timeout_seconds = timeout, "Command timed out");
                return Ok(ToolResult::error(format!(
                    "Error: Command timed out after {timeout}s: {command}"
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut parts: Vec<String> = Vec::new();
        if !stdout.is_empty() {
            parts.push(stdout.into_owned());
        }
        if !stderr.is_empty() {
            parts.push(format!("[stderr]\n{stderr}"));
        }
        let success = output.status.success();
        if !success {
            parts.push(format!("[exit code: {}]", output.status.code().unwrap_or(-1)));
        }

        let text = if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        };

        Ok(ToolResult {
            success,
            output: truncate_middle(&text),
        })
    }
}

/// Keep the head and tail of oversized output, dropping the middle.
fn truncate_middle(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= OUTPUT_LIMIT {
        return text.to_string();
    }
    let half = OUTPUT_LIMIT / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!(
        "{head}\n\n[... truncated {} chars ...]\n\n{tail}",
        chars.len() - OUTPUT_LIMIT
    )
}
