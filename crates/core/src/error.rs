//! Error types for the Talon domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Propagation policy: per-step and per-job failures are *recorded* in
//! result structures, never surfaced as service-level errors. Only invalid
//! definitions, invalid schedules, and storage problems fail the outer call.

use thiserror::Error;

/// The top-level error type for all Talon operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Workflow errors ---
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    // --- Cron errors ---
    #[error("Cron error: {0}")]
    Cron(#[from] CronError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow '{name}' failed validation:\n{}", .errors.join("\n"))]
    InvalidDefinition { name: String, errors: Vec<String> },

    #[error("Workflow name '{0}' is not a safe path component")]
    InvalidName(String),

    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum CronError {
    #[error("Invalid cron schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    #[error("Cron job not found: {0}")]
    NotFound(String),

    #[error("Invalid reply_to '{0}': expected 'channel:chat_id'")]
    InvalidReplyTo(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Session key '{0}' does not route to a channel")]
    NotRoutable(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Command blocked: {0}")]
    UnsafeCommand(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Failed(String),
}
