//! Pure text chunking (C7): no I/O, no async.

use serde_json::Value as JsonValue;

#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub content: String,
    pub metadata: JsonValue,
}

/// Splits `text` into overlapping windows of up to `max_chunk_size`
/// characters with `overlap_size` characters of overlap. `metadata` is
/// stamped onto every resulting chunk unchanged.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap_size: usize, metadata: &JsonValue) -> Vec<PreparedChunk> {
    if text.is_empty() || max_chunk_size == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chunk_size {
        return vec![PreparedChunk {
            content: text.to_string(),
            metadata: metadata.clone(),
        }];
    }

    let step = max_chunk_size.saturating_sub(overlap_size).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chunk_size).min(chars.len());
        let content: String = chars[start..end].iter().collect();
        chunks.push(PreparedChunk {
            content,
            metadata: metadata.clone(),
        });
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 1000, 100, &serde_json::json!({}));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
    }

    #[test]
    fn long_text_overlaps_by_configured_amount() {
        let text: String = (0..250).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let chunks = chunk_text(&text, 100, 20, &serde_json::json!({"k": "v"}));
        assert!(chunks.len() > 1);
        for w in chunks.windows(2) {
            let overlap_candidate = &w[0].content[w[0].content.len() - 20..];
            assert!(w[1].content.starts_with(overlap_candidate));
        }
        for c in &chunks {
            assert_eq!(c.metadata, serde_json::json!({"k": "v"}));
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100, 10, &serde_json::json!({})).is_empty());
    }
}
