#![no_main]

use libfuzzer_sys::fuzz_target;
use relay_stream::{split_message, MIN_SPLIT_BUDGET};

fn non_whitespace(text: &str) -> String {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

fuzz_target!(|data: &[u8]| {
    let Some((&budget_byte, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);
    let budget = usize::from(budget_byte).max(MIN_SPLIT_BUDGET);

    let chunks = split_message(&text, budget);
    for chunk in &chunks {
        assert!(!chunk.is_empty());
        assert!(chunk.len() <= budget);
        assert_eq!(chunk.trim(), chunk.as_str());
    }
    assert_eq!(non_whitespace(&chunks.concat()), non_whitespace(&text));
});
