#![no_main]

use libfuzzer_sys::fuzz_target;
use relay_telegram::{parse_telegram_update, to_markdown_v2, TelegramUpdate};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let _ = to_markdown_v2(&raw);

    let Ok(update) = serde_json::from_str::<Value>(&raw) else {
        return;
    };
    match parse_telegram_update(&update) {
        Ok(TelegramUpdate::Message(message)) | Ok(TelegramUpdate::Command { message, .. }) => {
            assert!(!message.chat_id.trim().is_empty());
            assert!(!message.user_id.trim().is_empty());
            assert!(!message.text.trim().is_empty());
        }
        Ok(TelegramUpdate::Ignored { reason }) => assert!(!reason.is_empty()),
        Err(error) => assert!(error.reason_code.starts_with("telegram_")),
    }
});
