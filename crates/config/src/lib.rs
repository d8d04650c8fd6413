//! Configuration loading, validation, and management for Talon.
//!
//! Loads configuration from `<workspace>/talon.toml` (or an explicit path)
//! with serde defaults for every field, so an empty file is a valid config.
//! Channel tokens are redacted from `Debug` output.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use talon_core::error::Error;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the agent workspace. Holds `cron/`, `workflows/`, `HEARTBEAT.md`.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Cron service configuration
    #[serde(default)]
    pub cron: CronConfig,

    /// Heartbeat service configuration
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Channel token configuration
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Shell tool configuration
    #[serde(default)]
    pub shell: ShellConfig,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            cron: CronConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            channels: ChannelsConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("workspace", &self.workspace)
            .field("cron", &self.cron)
            .field("heartbeat", &self.heartbeat)
            .field("channels", &self.channels)
            .field("shell", &self.shell)
            .finish()
    }
}

/// Cron service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Deadline for a single job execution, in minutes.
    #[serde(default = "default_exec_timeout_minutes")]
    pub exec_timeout_minutes: u64,
}

fn default_exec_timeout_minutes() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exec_timeout_minutes: default_exec_timeout_minutes(),
        }
    }
}

/// Heartbeat service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Sleep between heartbeats, in minutes.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_minutes: u64,

    /// Where heartbeat results are delivered (`channel:chat_id`, or empty).
    #[serde(default)]
    pub reply_to: String,
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_heartbeat_interval(),
            reply_to: String::new(),
        }
    }
}

/// One chat platform's credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ChannelEntry {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: String,
}

impl std::fmt::Debug for ChannelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEntry")
            .field("enabled", &self.enabled)
            .field("token", &redact(&self.token))
            .finish()
    }
}

/// Hide a secret in Debug output; only reveal whether one is set.
fn redact(s: &str) -> &'static str {
    if s.is_empty() { "<unset>" } else { "[REDACTED]" }
}

/// Per-channel token configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: ChannelEntry,

    #[serde(default)]
    pub discord: ChannelEntry,

    #[serde(default)]
    pub slack: ChannelEntry,
}

impl ChannelsConfig {
    /// Token for a channel by name; empty string when unknown or unset.
    pub fn token_for(&self, channel: &str) -> &str {
        match channel {
            "telegram" => &self.telegram.token,
            "discord" => &self.discord.token,
            "slack" => &self.slack.token,
            _ => "",
        }
    }

    /// Whether any channel has a token configured.
    pub fn any_configured(&self) -> bool {
        !self.telegram.token.is_empty()
            || !self.discord.token.is_empty()
            || !self.slack.token.is_empty()
    }
}

/// Shell tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Default command timeout, in seconds.
    #[serde(default = "default_shell_timeout")]
    pub timeout_seconds: u64,
}

fn default_shell_timeout() -> u64 {
    60
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_shell_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the default configuration; a malformed file is
    /// an error (silently running with defaults would mask typos).
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Config {
                    message: format!("Failed to read {}: {e}", path.display()),
                });
            }
        };

        let config: AppConfig = toml::from_str(&content).map_err(|e| Error::Config {
            message: format!("Failed to parse {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde defaults cannot enforce.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cron.exec_timeout_minutes == 0 {
            return Err(Error::Config {
                message: "cron.exec_timeout_minutes must be >= 1".into(),
            });
        }
        if self.heartbeat.interval_minutes == 0 {
            return Err(Error::Config {
                message: "heartbeat.interval_minutes must be >= 1".into(),
            });
        }
        if !self.heartbeat.reply_to.is_empty() && !self.heartbeat.reply_to.contains(':') {
            return Err(Error::Config {
                message: format!(
                    "heartbeat.reply_to '{}' is invalid; expected 'channel:chat_id'",
                    self.heartbeat.reply_to
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_with_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.cron.enabled);
        assert_eq!(config.cron.exec_timeout_minutes, 10);
        assert!(!config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval_minutes, 30);
        assert_eq!(config.shell.timeout_seconds, 60);
    }

    #[test]
    fn partial_config_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            [heartbeat]
            enabled = true
            interval_minutes = 5
            reply_to = "telegram:99999"

            [channels.telegram]
            enabled = true
            token = "bot123"
            "#,
        )
        .unwrap();
        assert!(config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval_minutes, 5);
        assert_eq!(config.channels.token_for("telegram"), "bot123");
        assert_eq!(config.channels.token_for("discord"), "");
        assert_eq!(config.channels.token_for("email"), "");
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("talon.toml")).unwrap();
        assert!(config.cron.enabled);
    }

    #[test]
    fn load_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talon.toml");
        std::fs::write(&path, "this is not toml [[[").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let config: AppConfig = toml::from_str("[cron]\nexec_timeout_minutes = 0").unwrap();
        assert!(config.validate().is_err());

        let config: AppConfig = toml::from_str("[heartbeat]\ninterval_minutes = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_reply_to() {
        let config: AppConfig = toml::from_str("[heartbeat]\nreply_to = \"bad_format\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_tokens() {
        let config: AppConfig = toml::from_str(
            "[channels.telegram]\nenabled = true\ntoken = \"bot-secret-123\"",
        )
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("bot-secret-123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn any_configured() {
        let mut config = ChannelsConfig::default();
        assert!(!config.any_configured());
        config.slack.token = "xoxb-1".into();
        assert!(config.any_configured());
    }
}
