use std::sync::Arc;
use std::time::Duration;

use crate::{split_message, ChatMessage, ChatSink, ChatSinkError, ClassifiedAction};

pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4_096;
pub const DEFAULT_INTER_CHUNK_DELAY_MS: u64 = 100;
pub const ALERT_PREFIX: &str = "ℹ️ ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub max_message_bytes: usize,
    /// Pause between consecutive sends; chat platforms may reorder rapid sends.
    pub inter_chunk_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            inter_chunk_delay_ms: DEFAULT_INTER_CHUNK_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub chunk_count: usize,
    pub chunks_sent: usize,
    pub error: Option<ChatSinkError>,
}

/// Renders one action to the text shown in chat, or `None` for `Ignore`.
pub fn render_action(action: &ClassifiedAction) -> Option<String> {
    match action {
        ClassifiedAction::EmitText(text) => Some(text.clone()),
        ClassifiedAction::EmitToolSummary { rendered, .. } => Some(rendered.clone()),
        ClassifiedAction::EmitAlert(text) => Some(format!("{ALERT_PREFIX}{text}")),
        ClassifiedAction::Ignore => None,
    }
}

/// Ordered delivery of classified actions to one chat.
///
/// One pipeline serves one stream pass. Sends are strictly sequential and
/// the inter-chunk delay is applied before every send except the first.
pub struct DeliveryPipeline {
    sink: Arc<dyn ChatSink>,
    chat_id: String,
    config: DeliveryConfig,
    sends: usize,
}

impl DeliveryPipeline {
    pub fn new(sink: Arc<dyn ChatSink>, chat_id: impl Into<String>, config: DeliveryConfig) -> Self {
        Self {
            sink,
            chat_id: chat_id.into(),
            config,
            sends: 0,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn sink(&self) -> &Arc<dyn ChatSink> {
        &self.sink
    }

    /// Delivers `action` chunk by chunk. A failed send is logged and the
    /// remaining chunks of this action are dropped; nothing is retried.
    pub async fn deliver(&mut self, action: &ClassifiedAction) -> DeliveryReport {
        let Some(text) = render_action(action) else {
            return DeliveryReport::default();
        };
        self.deliver_text(action.kind(), &text).await
    }

    pub async fn deliver_alert(&mut self, text: &str) -> DeliveryReport {
        self.deliver(&ClassifiedAction::EmitAlert(text.to_string()))
            .await
    }

    pub async fn deliver_text(&mut self, kind: &str, text: &str) -> DeliveryReport {
        let chunks = split_message(text, self.config.max_message_bytes);
        let mut report = DeliveryReport {
            chunk_count: chunks.len(),
            ..DeliveryReport::default()
        };
        for (index, chunk) in chunks.into_iter().enumerate() {
            if self.sends > 0 && self.config.inter_chunk_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_chunk_delay_ms)).await;
            }
            self.sends += 1;
            let message = ChatMessage::new(self.chat_id.clone(), chunk);
            match self.sink.send(&message).await {
                Ok(()) => report.chunks_sent += 1,
                Err(error) => {
                    tracing::warn!(
                        chat_id = self.chat_id.as_str(),
                        action = kind,
                        chunk_index = index,
                        chunk_count = report.chunk_count,
                        reason_code = error.reason_code.as_str(),
                        retryable = error.retryable,
                        http_status = ?error.http_status,
                        detail = error.detail.as_str(),
                        "chat delivery failed; dropping remaining chunks"
                    );
                    report.error = Some(error);
                    break;
                }
            }
        }
        tracing::debug!(
            chat_id = self.chat_id.as_str(),
            action = kind,
            chunk_count = report.chunk_count,
            chunks_sent = report.chunks_sent,
            "delivered action"
        );
        report
    }
}
