//! AgentEngine trait — the contract with the opaque agent engine.
//!
//! The engine is a black box that consumes a prompt and produces a textual
//! response after some number of internal iterations. Workflow steps, cron
//! jobs, and the heartbeat all drive it through this one method; callers
//! enforce their own deadlines by dropping the future.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// The result of one engine run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// The engine's final textual response.
    pub response: String,

    /// How many internal loop iterations the engine performed.
    pub iterations: u32,

    /// Total tokens consumed across the run.
    pub total_tokens: u32,
}

/// The engine contract consumed by workflow, cron, and heartbeat alike.
///
/// `profile` selects an opaque engine configuration; `"default"` must always
/// be accepted. Implementations are expected to be cancel-safe: a dropped
/// future must not leave the engine in a broken state.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    async fn run(
        &self,
        prompt: &str,
        session_key: &str,
        profile: &str,
    ) -> std::result::Result<RunResult, EngineError>;
}
