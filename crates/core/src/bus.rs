//! Message bus contract — fire-and-forget outbound delivery.
//!
//! Services publish results tagged with a channel and chat id; whoever
//! implements the bus decides how (and whether) the message reaches the
//! platform. Publishing never fails from the caller's point of view —
//! transport problems are the implementation's to log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An outbound message destined for a chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Target channel name (e.g. "telegram").
    pub channel: String,

    /// Platform-specific chat identifier.
    pub chat_id: String,

    /// The message text.
    pub text: String,
}

/// The bus contract consumed by the cron and heartbeat services.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish an outbound message. Fire-and-forget.
    async fn publish_outbound(&self, msg: OutboundMessage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures outbound messages for assertion.
    pub struct RecordingBus {
        pub messages: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageBus for RecordingBus {
        async fn publish_outbound(&self, msg: OutboundMessage) {
            self.messages.lock().unwrap().push(msg);
        }
    }

    #[tokio::test]
    async fn bus_records_published_messages() {
        let bus = RecordingBus {
            messages: Mutex::new(Vec::new()),
        };
        bus.publish_outbound(OutboundMessage {
            channel: "telegram".into(),
            chat_id: "99999".into(),
            text: "hello".into(),
        })
        .await;

        let messages = bus.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, "telegram");
        assert_eq!(messages[0].chat_id, "99999");
    }
}
