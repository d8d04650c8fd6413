//! # Talon Core
//!
//! Domain types, traits, and error definitions for the Talon agent runtime.
//! This crate has **zero framework dependencies** — it defines the contracts
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The agent engine and the message bus are external collaborators: Talon
//! drives an opaque engine on behalf of several concurrent triggers (ad-hoc
//! requests, cron jobs, the heartbeat, workflow steps) and publishes results
//! on a bus. Both are defined as traits here so that services and tools can
//! be tested against in-process fakes.

pub mod bus;
pub mod engine;
pub mod error;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use bus::{MessageBus, OutboundMessage};
pub use engine::{AgentEngine, RunResult};
pub use error::{
    ChannelError, CronError, EngineError, Error, Result, ToolError, WorkflowError,
};
pub use session::SessionKey;
pub use tool::{Tool, ToolContext, ToolRegistry, ToolResult};
