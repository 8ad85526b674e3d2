/// Smallest budget the splitter honors; every UTF-8 code point fits in it.
pub const MIN_SPLIT_BUDGET: usize = 4;

const BOUNDARIES: [&[u8]; 3] = [b"\n\n", b"\n", b" "];

/// Splits `text` into trimmed, non-empty chunks of at most `max_bytes` UTF-8
/// bytes, preferring paragraph breaks, then line breaks, then spaces, and
/// hard-cutting on a code point boundary only when no separator fits.
pub fn split_message(text: &str, max_bytes: usize) -> Vec<String> {
    let budget = max_bytes.max(MIN_SPLIT_BUDGET);
    let mut chunks = Vec::new();
    let mut remaining = text.trim();
    while !remaining.is_empty() {
        if remaining.len() <= budget {
            chunks.push(remaining.to_string());
            break;
        }
        let cut = natural_boundary(remaining.as_bytes(), budget)
            .unwrap_or_else(|| floor_char_boundary(remaining, budget));
        let (head, tail) = remaining.split_at(cut);
        let head = head.trim();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        remaining = tail.trim();
    }
    chunks
}

// Separators are ASCII, so any match offset is a char boundary. Offset zero
// is excluded to guarantee progress.
fn natural_boundary(bytes: &[u8], budget: usize) -> Option<usize> {
    let limit = budget.min(bytes.len().saturating_sub(1));
    BOUNDARIES.iter().find_map(|separator| {
        (1..=limit)
            .rev()
            .find(|&offset| bytes[offset..].starts_with(separator))
    })
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
