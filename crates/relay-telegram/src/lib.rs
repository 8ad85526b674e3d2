//! Telegram transport for the chat relay: Bot API delivery sink and webhook
//! update parsing.
mod markdown;
mod sink;
mod update;

pub use markdown::{escape_plain, to_markdown_v2};
pub use sink::{
    fit_to_limit, TelegramConfig, TelegramSink, DEFAULT_TELEGRAM_API_BASE,
    TELEGRAM_MAX_MESSAGE_BYTES, TRUNCATION_NOTICE,
};
pub use update::{parse_telegram_update, TelegramUpdate, TelegramUpdateError};
