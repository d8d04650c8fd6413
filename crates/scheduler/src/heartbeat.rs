//! Heartbeat service: periodic autonomous agent wake-up.
//!
//! Reads `HEARTBEAT.md` from the workspace root at a configurable interval
//! and sends its contents to the engine as a user message. This lets the
//! agent perform periodic self-directed tasks: checking system health,
//! summarising recent activity, running maintenance.
//!
//! If `HEARTBEAT.md` is missing or empty, the beat is silently skipped.
//! `stop()` wakes the interval sleep immediately.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use talon_config::HeartbeatConfig;
use talon_core::bus::{MessageBus, OutboundMessage};
use talon_core::engine::AgentEngine;
use talon_core::session::{HEARTBEAT_SESSION_KEY, split_reply_to};
use talon_telemetry::RuntimeMetrics;

const HEARTBEAT_FILE: &str = "HEARTBEAT.md";

/// Periodically reads `HEARTBEAT.md` and feeds it to the engine.
pub struct HeartbeatService {
    heartbeat_file: PathBuf,
    engine: Arc<dyn AgentEngine>,
    config: HeartbeatConfig,
    bus: Option<Arc<dyn MessageBus>>,
    metrics: Arc<RuntimeMetrics>,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl HeartbeatService {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        engine: Arc<dyn AgentEngine>,
        config: HeartbeatConfig,
        bus: Option<Arc<dyn MessageBus>>,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        Self {
            heartbeat_file: workspace_root.into().join(HEARTBEAT_FILE),
            engine,
            config,
            bus,
            metrics,
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Run the heartbeat loop until stopped.
    pub async fn run(&self) {
        if !self.config.enabled {
            debug!("Heartbeat service disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_minutes * 60);
        info!(interval_minutes = self.config.interval_minutes, "Heartbeat service started");

        while !self.stopped.load(Ordering::SeqCst) {
            match tokio::time::timeout(interval, self.stop_notify.notified()).await {
                // Stop was signalled mid-sleep.
                Ok(()) => break,
                // The interval elapsed.
                Err(_) => {
                    if !self.stopped.load(Ordering::SeqCst) {
                        self.beat().await;
                    }
                }
            }
        }
        debug!("Heartbeat service stopped");
    }

    /// Signal the loop to stop; the current sleep returns immediately.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }

    /// Read `HEARTBEAT.md` and send it to the engine if it has content.
    async fn beat(&self) {
        let content = match std::fs::read_to_string(&self.heartbeat_file) {
            Ok(c) => c,
            Err(_) => {
                debug!("No HEARTBEAT.md found, skipping");
                return;
            }
        };
        let content = content.trim();
        if content.is_empty() {
            debug!("HEARTBEAT.md is empty, skipping");
            return;
        }

        info!(chars = content.len(), "Heartbeat triggered");
        self.metrics.heartbeat_runs.incr();

        match self
            .engine
            .run(content, HEARTBEAT_SESSION_KEY, "default")
            .await
        {
            Ok(result) => {
                info!(
                    iterations = result.iterations,
                    total_tokens = result.total_tokens,
                    "Heartbeat completed"
                );
                if !result.response.is_empty() {
                    self.publish_result(result.response).await;
                }
            }
            Err(e) => {
                error!(error = %e, "Heartbeat run failed");
                self.publish_result(format!("Heartbeat run failed: {e}")).await;
            }
        }
    }

    /// Publish a heartbeat result to the bus for channel delivery.
    async fn publish_result(&self, text: String) {
        if self.config.reply_to.is_empty() {
            return;
        }
        let Some(bus) = &self.bus else {
            return;
        };

        let Some((channel, chat_id)) = split_reply_to(&self.config.reply_to) else {
            warn!(reply_to = %self.config.reply_to, "Invalid reply_to format for heartbeat");
            return;
        };

        bus.publish_outbound(OutboundMessage {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            text,
        })
        .await;
        info!(channel = %channel, chat_id = %chat_id, "Heartbeat result published");
    }
}
