//! Session keys — routing tags of the form `<channel>:<id>`.
//!
//! Every agent request carries a session key identifying where it came from
//! and, for the first three channels, where its reply should be delivered.
//! Only `telegram`, `discord`, and `slack` route to external transports;
//! `cli`, `workflow`, `heartbeat`, and `cron` keys are synthetic.

use serde::{Deserialize, Serialize};

/// Channels that route to an external transport.
pub const ROUTABLE_CHANNELS: [&str; 3] = ["telegram", "discord", "slack"];

/// The synthetic key for a non-routable interactive session.
pub const CLI_SESSION_KEY: &str = "cli:interactive";

/// The fixed session key used by the heartbeat service.
pub const HEARTBEAT_SESSION_KEY: &str = "heartbeat:periodic";

/// A parsed session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    /// The synthetic key for a cron job without a `reply_to`.
    pub fn for_cron_job(job_id: &str) -> Self {
        Self(format!("cron:{job_id}"))
    }

    /// The per-step key used by the workflow engine.
    pub fn for_workflow_step(workflow: &str, step: &str) -> Self {
        Self(format!("workflow:{workflow}:{step}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Split a key into `(channel, id)` if it routes to an external transport.
///
/// Returns `None` for malformed keys, empty ids, and synthetic channels
/// (`cli`, `workflow`, `heartbeat`, `cron`).
pub fn routable_target(key: &str) -> Option<(&str, &str)> {
    let (channel, id) = key.split_once(':')?;
    if id.is_empty() || !ROUTABLE_CHANNELS.contains(&channel) {
        return None;
    }
    Some((channel, id))
}

/// Split a `reply_to` value into `(channel, chat_id)`.
///
/// A well-formed reply target is any `channel:chat_id` pair with both parts
/// non-empty; whether the channel actually routes is the sender's concern.
pub fn split_reply_to(reply_to: &str) -> Option<(&str, &str)> {
    let (channel, chat_id) = reply_to.split_once(':')?;
    if channel.is_empty() || chat_id.is_empty() {
        return None;
    }
    Some((channel, chat_id))
}
