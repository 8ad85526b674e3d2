use relay_stream::InboundMessage;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason_code}: {message}")]
/// Webhook payload that claims to carry a message but cannot be read.
pub struct TelegramUpdateError {
    pub reason_code: &'static str,
    pub message: String,
}

impl TelegramUpdateError {
    fn new(reason_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason_code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramUpdate {
    /// Plain text to relay to the agent.
    Message(InboundMessage),
    /// Text starting with `/`; `name` is lowercased without the `@bot` suffix.
    Command { name: String, message: InboundMessage },
    /// Update kinds the relay does not act on (edits, stickers, joins, ...).
    Ignored { reason: &'static str },
}

/// Reads one Telegram `Update` object. Never panics on arbitrary JSON.
pub fn parse_telegram_update(update: &Value) -> Result<TelegramUpdate, TelegramUpdateError> {
    let update = update.as_object().ok_or_else(|| {
        TelegramUpdateError::new("telegram_update_not_object", "update must be a JSON object")
    })?;
    let Some(message) = update.get("message") else {
        return Ok(TelegramUpdate::Ignored {
            reason: "no_message",
        });
    };
    let message = message.as_object().ok_or_else(|| {
        TelegramUpdateError::new("telegram_invalid_message", "update.message must be an object")
    })?;
    let Some(text) = message
        .get("text")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
    else {
        return Ok(TelegramUpdate::Ignored {
            reason: "no_text",
        });
    };

    let chat = object_field(message, "chat")?;
    let from = object_field(message, "from")?;
    let chat_id = id_field(chat, "message.chat.id")?;
    let user_id = id_field(from, "message.from.id")?;
    let user_name = ["username", "first_name"].iter().find_map(|key| {
        from.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    });

    let inbound = InboundMessage {
        chat_id,
        user_id,
        user_name,
        text: text.to_string(),
    };
    match command_name(text) {
        Some(name) => Ok(TelegramUpdate::Command {
            name,
            message: inbound,
        }),
        None => Ok(TelegramUpdate::Message(inbound)),
    }
}

fn object_field<'a>(
    object: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Map<String, Value>, TelegramUpdateError> {
    object.get(key).and_then(Value::as_object).ok_or_else(|| {
        TelegramUpdateError::new(
            "telegram_missing_field",
            format!("message.{key} must be an object"),
        )
    })
}

fn id_field(object: &Map<String, Value>, path: &str) -> Result<String, TelegramUpdateError> {
    match object.get("id") {
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(Value::String(raw)) if !raw.trim().is_empty() => Ok(raw.trim().to_string()),
        _ => Err(TelegramUpdateError::new(
            "telegram_missing_field",
            format!("{path} is required"),
        )),
    }
}

fn command_name(text: &str) -> Option<String> {
    let command = text.trim_start().strip_prefix('/')?;
    let token = command.split_whitespace().next()?;
    let name = token.split('@').next().unwrap_or(token);
    if name.is_empty() {
        return None;
    }
    Some(name.to_ascii_lowercase())
}
