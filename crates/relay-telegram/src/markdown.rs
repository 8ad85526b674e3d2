//! Plain chat markdown to Telegram MarkdownV2.
//!
//! Only the constructs the relay itself produces are translated: `**bold**`,
//! inline code, fenced code blocks and `> ` blockquote lines. Every other
//! reserved character is escaped so Telegram renders it literally.

const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    '\\',
];
const FENCE: &str = "```";

pub fn to_markdown_v2(text: &str) -> String {
    let mut output = String::with_capacity(text.len() + text.len() / 8);
    let mut in_fence = false;
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            output.push('\n');
        }
        if let Some(info) = line.trim_start().strip_prefix(FENCE) {
            output.push_str(FENCE);
            if !in_fence {
                let language = info.trim();
                if language.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
                    output.push_str(language);
                }
            }
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            output.push_str(&escape_code(line));
            continue;
        }
        if let Some(quoted) = line.strip_prefix('>') {
            output.push('>');
            output.push_str(&convert_inline(quoted.strip_prefix(' ').unwrap_or(quoted)));
            continue;
        }
        output.push_str(&convert_inline(line));
    }
    if in_fence {
        output.push('\n');
        output.push_str(FENCE);
    }
    output
}

pub fn escape_plain(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if RESERVED.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn escape_code(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '`' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn convert_inline(line: &str) -> String {
    let mut output = String::with_capacity(line.len());
    let mut rest = line;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**").filter(|end| *end > 0) {
                output.push('*');
                output.push_str(&escape_plain(&after[..end]));
                output.push('*');
                rest = &after[end + 2..];
                continue;
            }
        }
        if let Some(after) = rest.strip_prefix('`') {
            if let Some(end) = after.find('`').filter(|end| *end > 0) {
                output.push('`');
                output.push_str(&escape_code(&after[..end]));
                output.push('`');
                rest = &after[end + 1..];
                continue;
            }
        }
        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            if RESERVED.contains(&ch) {
                output.push('\\');
            }
            output.push(ch);
        }
        rest = chars.as_str();
    }
    output
}
