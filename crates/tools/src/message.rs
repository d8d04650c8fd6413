//! Messaging tools — let the agent push text and files to chat channels.
//!
//! Both tools deliver through a single callback contract: an async function
//! of the target session key plus payload. [`sync_message_callback`] and
//! [`sync_file_callback`] adapt synchronous functions onto it, and
//! [`wire_direct_sender`] plugs in the real [`DirectSender`].
//!
//! Explicit `channel` + `chat_id` parameters override the ambient session
//! key only when both are present; otherwise the reply goes back to the
//! conversation that invoked the tool.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use talon_channels::DirectSender;
use talon_core::error::ToolError;
use talon_core::tool::{Tool, ToolContext, ToolResult};

/// Async delivery callback: `(session_key, text)`.
pub type SendMessageFn = Arc<dyn Fn(String, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Async file-delivery callback: `(session_key, path, caption)`.
pub type SendFileFn = Arc<dyn Fn(String, String, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Adapt a synchronous function to the async message-callback contract.
pub fn sync_message_callback<F>(f: F) -> SendMessageFn
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    Arc::new(move |session_key: String, text: String| -> BoxFuture<'static, ()> {
        f(&session_key, &text);
        Box::pin(std::future::ready(()))
    })
}

/// Adapt a synchronous function to the async file-callback contract.
pub fn sync_file_callback<F>(f: F) -> SendFileFn
where
    F: Fn(&str, &str, &str) + Send + Sync + 'static,
{
    Arc::new(
        move |session_key: String, path: String, caption: String| -> BoxFuture<'static, ()> {
            f(&session_key, &path, &caption);
            Box::pin(std::future::ready(()))
        },
    )
}

/// Resolve the delivery target: explicit channel + chat_id win over the
/// ambient session key; a lone channel without chat_id falls back.
fn resolve_target(arguments: &serde_json::Value, ctx: &ToolContext) -> String {
    match (
        arguments["channel"].as_str(),
        arguments["chat_id"].as_str(),
    ) {
        (Some(channel), Some(chat_id)) => format!("{channel}:{chat_id}"),
        _ => ctx.session_key.clone(),
    }
}

/// Send a text message to a chat channel.
#[derive(Default)]
pub struct MessageTool {
    callback: Option<SendMessageFn>,
}

impl MessageTool {
    pub fn new() -> Self {
        Self { callback: None }
    }

    pub fn with_callback(callback: SendMessageFn) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn set_callback(&mut self, callback: SendMessageFn) {
        self.callback = Some(callback);
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to the current chat, or to an explicit channel/chat_id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The message text to send."
                },
                "channel": {
                    "type": "string",
                    "description": "Target channel (telegram, discord, slack). Overrides the current session together with chat_id."
                },
                "chat_id": {
                    "type": "string",
                    "description": "Target chat id. Only used when channel is also given."
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        let Some(callback) = &self.callback else {
            return Ok(ToolResult::ok("No active channel to send the message to."));
        };

        let target = resolve_target(&arguments, ctx);
        debug!(target = %target, chars = text.len(), "send_message");
        callback(target.clone(), text.to_string()).await;
        Ok(ToolResult::ok(format!("Message sent to {target}.")))
    }
}

/// Send a file to a chat channel.
#[derive(Default)]
pub struct SendFileTool {
    callback: Option<SendFileFn>,
}

impl SendFileTool {
    pub fn new() -> Self {
        Self { callback: None }
    }

    pub fn with_callback(callback: SendFileFn) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn set_callback(&mut self, callback: SendFileFn) {
        self.callback = Some(callback);
    }
}

#[async_trait]
impl Tool for SendFileTool {
    fn name(&self) -> &str {
        "send_file"
    }

    fn description(&self) -> &str {
        "Send a file from the workspace to the current chat, or to an explicit channel/chat_id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to send."
                },
                "caption": {
                    "type": "string",
                    "description": "Optional caption."
                },
                "channel": {
                    "type": "string",
                    "description": "Target channel (telegram, discord, slack). Overrides the current session together with chat_id."
                },
                "chat_id": {
                    "type": "string",
                    "description": "Target chat id. Only used when channel is also given."
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;
        let caption = arguments["caption"].as_str().unwrap_or("");

        if !std::path::Path::new(file_path).exists() {
            return Ok(ToolResult::error(format!("Error: file not found: {file_path}")));
        }

        let Some(callback) = &self.callback else {
            return Ok(ToolResult::ok("No active channel to send the file to."));
        };

        let target = resolve_target(&arguments, ctx);
        debug!(target = %target, path = %file_path, "send_file");
        callback(target.clone(), file_path.to_string(), caption.to_string()).await;
        Ok(ToolResult::ok(format!("File sent to {target}.")))
    }
}

/// Wire both messaging tools to a [`DirectSender`].
pub fn wire_direct_sender(
    sender: Arc<DirectSender>,
    message_tool: &mut MessageTool,
    file_tool: &mut SendFileTool,
) {
    let for_messages = sender.clone();
    message_tool.set_callback(Arc::new(
        move |session_key: String, text: String| -> BoxFuture<'static, ()> {
            let sender = for_messages.clone();
            Box::pin(async move { sender.send_message(&session_key, &text).await })
        },
    ));

    file_tool.set_callback(Arc::new(
        move |session_key: String, path: String, caption: String| -> BoxFuture<'static, ()> {
            let sender = sender.clone();
            Box::pin(async move { sender.send_file(&session_key, &path, &caption).await })
        },
    ));
}
