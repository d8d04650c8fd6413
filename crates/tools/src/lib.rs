//! Built-in tool implementations for Talon agents.
//!
//! - `exec` — shell commands behind the multi-layer deny filter
//! - `scheduler` — natural-language cron job CRUD over `cron/jobs.json`
//! - `workflow` — DAG workflow CRUD over the workflow store
//! - `send_message` / `send_file` — channel delivery through a wired callback

pub mod message;
pub mod scheduler;
pub mod shell;
pub mod workflow;

pub use message::{
    MessageTool, SendFileFn, SendFileTool, SendMessageFn, wire_direct_sender,
};
pub use scheduler::SchedulerTool;
pub use shell::ExecTool;
pub use workflow::WorkflowTool;

use talon_core::tool::ToolRegistry;

/// Registry with every built-in tool.
///
/// `shell_timeout_seconds` is the exec tool's default deadline, normally
/// taken from the application's shell configuration. Messaging tools start
/// unwired; call [`wire_direct_sender`] before registering when a sender is
/// available.
pub fn builtin_registry(shell_timeout_seconds: u64) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ExecTool::new(shell_timeout_seconds)));
    registry.register(Box::new(SchedulerTool));
    registry.register(Box::new(WorkflowTool));
    registry.register(Box::new(MessageTool::new()));
    registry.register(Box::new(SendFileTool::new()));
    registry
}
