use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One outbound chat message. Text is already sized to the platform limit.
pub struct ChatMessage {
    pub chat_id: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Delivery failure reported by a chat sink.
pub struct ChatSinkError {
    pub reason_code: String,
    pub detail: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
}

impl ChatSinkError {
    pub fn new(reason_code: impl Into<String>, detail: impl Into<String>, retryable: bool) -> Self {
        Self {
            reason_code: reason_code.into(),
            detail: detail.into(),
            retryable,
            http_status: None,
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl std::fmt::Display for ChatSinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reason_code={} retryable={} http_status={} detail={}",
            self.reason_code,
            self.retryable,
            self.http_status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.detail
        )
    }
}

impl std::error::Error for ChatSinkError {}

#[async_trait]
/// Outbound side of the chat platform.
pub trait ChatSink: Send + Sync {
    async fn send(&self, message: &ChatMessage) -> Result<(), ChatSinkError>;

    /// Best-effort "still working" indicator; callers log failures and move on.
    async fn signal_activity(&self, chat_id: &str) -> Result<(), ChatSinkError>;
}
