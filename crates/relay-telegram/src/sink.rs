use std::time::Duration;

use async_trait::async_trait;
use relay_stream::{ChatMessage, ChatSink, ChatSinkError};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::to_markdown_v2;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const TELEGRAM_MAX_MESSAGE_BYTES: usize = 4_096;
pub const TRUNCATION_NOTICE: &str = "\n\n[Message truncated due to length limit]";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
const PARSE_MODE_MARKDOWN_V2: &str = "MarkdownV2";
const DETAIL_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub http_timeout_ms: u64,
    pub max_message_bytes: usize,
    /// Send MarkdownV2 first and fall back to raw text when Telegram rejects it.
    pub markdown: bool,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.into(),
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            max_message_bytes: TELEGRAM_MAX_MESSAGE_BYTES,
            markdown: true,
        }
    }
}

#[derive(Debug, Clone)]
/// Telegram Bot API delivery: `sendMessage` and `sendChatAction`.
pub struct TelegramSink {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    fn endpoint(&self, method: &str) -> Result<String, ChatSinkError> {
        let token = self.config.bot_token.trim();
        if token.is_empty() {
            return Err(ChatSinkError::new(
                "delivery_missing_telegram_bot_token",
                "Telegram delivery requires a bot token",
                false,
            ));
        }
        Ok(format!(
            "{}/bot{}/{}",
            self.config.api_base.trim().trim_end_matches('/'),
            token,
            method
        ))
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChatSinkError> {
        let endpoint = self.endpoint(method)?;
        let response = self
            .client
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(|error| {
                ChatSinkError::new("delivery_transport_error", redact(&error.to_string(), &self.config.bot_token), true)
            })?;
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<Value>(&raw).unwrap_or(Value::Null);
        if !status.is_success() {
            let (reason_code, retryable) = classify_provider_status(status);
            return Err(
                ChatSinkError::new(reason_code, truncate_detail(&raw), retryable)
                    .with_http_status(status.as_u16()),
            );
        }
        if payload.get("ok").and_then(Value::as_bool) == Some(false) {
            return Err(ChatSinkError::new(
                "delivery_request_rejected",
                truncate_detail(&raw),
                false,
            )
            .with_http_status(status.as_u16()));
        }
        Ok(payload)
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatSinkError> {
        let text = fit_to_limit(text, self.config.max_message_bytes);
        if !self.config.markdown {
            return self.send_raw(chat_id, &text).await;
        }
        let body = json!({
            "chat_id": chat_id.trim(),
            "text": to_markdown_v2(&text),
            "parse_mode": PARSE_MODE_MARKDOWN_V2,
        });
        match self.call("sendMessage", &body).await {
            Ok(_) => Ok(()),
            Err(error) if error.http_status == Some(StatusCode::BAD_REQUEST.as_u16()) => {
                tracing::warn!(
                    chat_id,
                    detail = error.detail.as_str(),
                    "telegram rejected formatted message; resending as plain text"
                );
                self.send_raw(chat_id, &text).await
            }
            Err(error) => Err(error),
        }
    }

    async fn send_raw(&self, chat_id: &str, text: &str) -> Result<(), ChatSinkError> {
        let body = json!({
            "chat_id": chat_id.trim(),
            "text": text,
        });
        self.call("sendMessage", &body).await.map(|_| ())
    }
}

#[async_trait]
impl ChatSink for TelegramSink {
    async fn send(&self, message: &ChatMessage) -> Result<(), ChatSinkError> {
        self.send_message(&message.chat_id, &message.text).await
    }

    async fn signal_activity(&self, chat_id: &str) -> Result<(), ChatSinkError> {
        let body = json!({
            "chat_id": chat_id.trim(),
            "action": "typing",
        });
        self.call("sendChatAction", &body).await.map(|_| ())
    }
}

/// Truncates text above `max_bytes` on a UTF-8 boundary and appends a notice
/// when the notice itself fits. The result never exceeds `max_bytes`.
/// The pipeline already splits to the limit; this guards direct callers.
pub fn fit_to_limit(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let notice = if max_bytes > TRUNCATION_NOTICE.len() {
        TRUNCATION_NOTICE
    } else {
        ""
    };
    let mut end = max_bytes - notice.len();
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    tracing::warn!(
        original_bytes = text.len(),
        kept_bytes = end,
        "truncating oversized telegram message"
    );
    format!("{}{notice}", &text[..end])
}

fn classify_provider_status(status: StatusCode) -> (&'static str, bool) {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ("delivery_rate_limited", true);
    }
    if status.is_server_error() {
        return ("delivery_provider_unavailable", true);
    }
    if status.is_client_error() {
        return ("delivery_request_rejected", false);
    }
    ("delivery_unknown_http_failure", true)
}

fn truncate_detail(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= DETAIL_LIMIT {
        return trimmed.to_string();
    }
    let mut output = trimmed.chars().take(DETAIL_LIMIT).collect::<String>();
    output.push_str("...");
    output
}

// reqwest errors embed the URL, which carries the bot token.
fn redact(detail: &str, token: &str) -> String {
    let token = token.trim();
    if token.is_empty() {
        detail.to_string()
    } else {
        detail.replace(token, "<redacted>")
    }
}
