//! Direct sender — session-key routed delivery to chat platforms.
//!
//! `send_message` and `send_file` parse the session key, look up the
//! channel token, and call the platform HTTP API. Delivery is best-effort:
//! unroutable keys, missing tokens, and transport failures are logged and
//! swallowed, never propagated to the triggering service.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use talon_config::ChannelsConfig;
use talon_core::bus::{MessageBus, OutboundMessage};
use talon_core::session::routable_target;

const TELEGRAM_API: &str = "https://api.telegram.org";
const DISCORD_API: &str = "https://discord.com/api/v10";
const SLACK_API: &str = "https://slack.com/api";

/// Sends messages and files straight to channel HTTP APIs.
pub struct DirectSender {
    config: ChannelsConfig,
    client: reqwest::Client,
}

impl DirectSender {
    pub fn new(config: ChannelsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn token_for(&self, channel: &str) -> &str {
        self.config.token_for(channel)
    }

    /// Send a text message to the chat identified by `session_key`.
    pub async fn send_message(&self, session_key: &str, text: &str) {
        let Some((channel, chat_id)) = routable_target(session_key) else {
            warn!(session_key = %session_key, "Session key does not route to a channel");
            return;
        };
        let token = self.token_for(channel);
        if token.is_empty() {
            warn!(channel = %channel, "No token configured, dropping message");
            return;
        }

        debug!(channel = %channel, chat_id = %chat_id, chars = text.len(), "Direct send");
        match channel {
            "telegram" => self.send_telegram(token, chat_id, text).await,
            "discord" => self.send_discord(token, chat_id, text).await,
            "slack" => self.send_slack(token, chat_id, text).await,
            _ => unreachable!("routable_target only yields known channels"),
        }
    }

    /// Upload a file to the chat identified by `session_key`.
    pub async fn send_file(&self, session_key: &str, path: &str, caption: &str) {
        let Some((channel, chat_id)) = routable_target(session_key) else {
            warn!(session_key = %session_key, "Session key does not route to a channel");
            return;
        };
        let token = self.token_for(channel);
        if token.is_empty() {
            warn!(channel = %channel, "No token configured, dropping file");
            return;
        }
        if !Path::new(path).exists() {
            error!(path = %path, "File to send does not exist");
            return;
        }

        info!(channel = %channel, chat_id = %chat_id, path = %path, "Direct file send");
        match channel {
            "telegram" => self.send_telegram_file(token, chat_id, path, caption).await,
            "discord" => self.send_discord_file(token, chat_id, path, caption).await,
            "slack" => self.send_slack_file(token, chat_id, path, caption).await,
            _ => unreachable!("routable_target only yields known channels"),
        }
    }

    // --- Per-channel message senders ---

    async fn send_telegram(&self, token: &str, chat_id: &str, text: &str) {
        let url = format!("{TELEGRAM_API}/bot{token}/sendMessage");
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await;
        log_outcome("telegram", result).await;
    }

    async fn send_discord(&self, token: &str, chat_id: &str, text: &str) {
        let url = format!("{DISCORD_API}/channels/{chat_id}/messages");
        let result = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {token}"))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await;
        log_outcome("discord", result).await;
    }

    async fn send_slack(&self, token: &str, chat_id: &str, text: &str) {
        let url = format!("{SLACK_API}/chat.postMessage");
        let result = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "channel": chat_id, "text": text }))
            .send()
            .await;
        log_outcome("slack", result).await;
    }

    // --- Per-channel file senders ---

    async fn send_telegram_file(&self, token: &str, chat_id: &str, path: &str, caption: &str) {
        let Some(part) = file_part(path).await else {
            return;
        };
        let url = format!("{TELEGRAM_API}/bot{token}/sendDocument");
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);
        let result = self.client.post(&url).multipart(form).send().await;
        log_outcome("telegram", result).await;
    }

    async fn send_discord_file(&self, token: &str, chat_id: &str, path: &str, caption: &str) {
        let Some(part) = file_part(path).await else {
            return;
        };
        let url = format!("{DISCORD_API}/channels/{chat_id}/messages");
        let form = reqwest::multipart::Form::new()
            .text("content", caption.to_string())
            .part("files[0]", part);
        let result = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {token}"))
            .multipart(form)
            .send()
            .await;
        log_outcome("discord", result).await;
    }

    async fn send_slack_file(&self, token: &str, chat_id: &str, path: &str, caption: &str) {
        let Some(part) = file_part(path).await else {
            return;
        };
        let url = format!("{SLACK_API}/files.upload");
        let form = reqwest::multipart::Form::new()
            .text("channels", chat_id.to_string())
            .text("initial_comment", caption.to_string())
            .part("file", part);
        let result = self
            .client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await;
        log_outcome("slack", result).await;
    }
}

/// Read a file into a multipart part, logging on failure.
async fn file_part(path: &str) -> Option<reqwest::multipart::Part> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %path, error = %e, "Failed to read file for upload");
            return None;
        }
    };
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    Some(reqwest::multipart::Part::bytes(bytes).file_name(file_name))
}

/// Best-effort delivery: failures are logged, never returned.
async fn log_outcome(channel: &str, result: Result<reqwest::Response, reqwest::Error>) {
    match result {
        Ok(response) if response.status().is_success() => {
            debug!(channel = %channel, "Delivered");
        }
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(channel = %channel, status = %status, body = %body, "Delivery rejected");
        }
        Err(e) => {
            warn!(channel = %channel, error = %e, "Delivery failed");
        }
    }
}

/// The sender doubles as the runtime's outbound bus: cron and heartbeat
/// publish `{channel, chat_id, text}` and it goes out as a direct send.
#[async_trait]
impl MessageBus for DirectSender {
    async fn publish_outbound(&self, msg: OutboundMessage) {
        let session_key = format!("{}:{}", msg.channel, msg.chat_id);
        self.send_message(&session_key, &msg.text).await;
    }
}

/// Build a sender when at least one channel token is configured.
pub fn build_sender(config: &ChannelsConfig) -> Option<Arc<DirectSender>> {
    if !config.any_configured() {
        return None;
    }
    Some(Arc::new(DirectSender::new(config.clone())))
}
