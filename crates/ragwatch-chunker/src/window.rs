//! Overlapping-window chunking.

use async_trait::async_trait;
use ragwatch_core::{ChunkConfig, ChunkError, ChunkOutput, Chunker};
use tracing::debug;

/// Overlapping-window chunker measured in characters.
pub struct WindowChunker;

impl WindowChunker {
    /// Create a new window chunker.
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Chunker for WindowChunker {
    fn name(&self) -> &str {
        "window"
    }

    async fn chunk(
        &self,
        text: &str,
        config: &ChunkConfig,
    ) -> Result<Vec<ChunkOutput>, ChunkError> {
        split_text(text, config)
    }
}

/// Split `text` into overlapping windows.
///
/// Every character lands in at least one chunk, no chunk exceeds
/// `chunk_size` characters, and each chunk starts exactly `chunk_overlap`
/// characters before the previous one ended.
pub fn split_text(text: &str, config: &ChunkConfig) -> Result<Vec<ChunkOutput>, ChunkError> {
    config.validate()?;
    if text.trim().is_empty() {
        return Err(ChunkError::EmptyInput);
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    // Byte offset and line number at every char boundary, including the end.
    let mut byte_at = Vec::with_capacity(total + 1);
    let mut line_at = Vec::with_capacity(total + 1);
    let (mut byte, mut line) = (0usize, 0u32);
    for c in &chars {
        byte_at.push(byte);
        line_at.push(line);
        byte += c.len_utf8();
        if *c == '\n' {
            line += 1;
        }
    }
    byte_at.push(byte);
    line_at.push(line);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let target_end = (start + config.chunk_size).min(total);
        let end = if target_end == total {
            total
        } else {
            find_break_point(&chars, start, target_end, config.chunk_overlap)
        };

        chunks.push(ChunkOutput {
            content: chars[start..end].iter().collect(),
            byte_range: byte_at[start] as u64..byte_at[end] as u64,
            line_range: Some(line_at[start]..line_at[end]),
        });

        if end == total {
            break;
        }
        start = end - config.chunk_overlap;
    }

    debug!(
        "Split {} chars into {} chunks (size {}, overlap {})",
        total,
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );
    Ok(chunks)
}

/// Pick an end position in the last fifth of the window.
///
/// Never returns a position at or before `start + overlap`, so the next
/// window always advances.
fn find_break_point(chars: &[char], start: usize, target_end: usize, overlap: usize) -> usize {
    let lo = (start + overlap + 1).max(target_end - (target_end - start) / 5);
    let total = chars.len();

    let paragraph = |e: usize| e >= 2 && chars[e - 1] == '\n' && chars[e - 2] == '\n';
    let newline = |e: usize| chars[e - 1] == '\n';
    let sentence = |e: usize| {
        matches!(chars[e - 1], '.' | '!' | '?') && e < total && chars[e].is_whitespace()
    };
    let space = |e: usize| chars[e - 1].is_whitespace();

    let tiers: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &newline, &sentence, &space];
    for accept in tiers {
        if let Some(e) = (lo..=target_end).rev().find(|&e| accept(e)) {
            return e;
        }
    }

    target_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig::new(size, overlap).unwrap()
    }

    /// Coverage, size and overlap hold for every output.
    fn assert_window_invariants(text: &str, chunks: &[ChunkOutput], size: usize, overlap: usize) {
        let total = text.chars().count();
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].byte_range.start, 0);
        assert_eq!(chunks.last().unwrap().byte_range.end, text.len() as u64);

        for chunk in chunks {
            assert!(chunk.content.chars().count() <= size);
            let range = chunk.byte_range.start as usize..chunk.byte_range.end as usize;
            assert_eq!(&text[range], chunk.content);
        }
        for pair in chunks.windows(2) {
            let shared = pair[0].byte_range.end.saturating_sub(pair[1].byte_range.start);
            let shared_chars = text[pair[1].byte_range.start as usize..][..shared as usize]
                .chars()
                .count();
            assert_eq!(shared_chars, overlap);
            assert!(pair[1].byte_range.start > pair[0].byte_range.start);
        }
        let covered: usize = chunks
            .iter()
            .map(|c| c.content.chars().count())
            .sum::<usize>()
            - overlap * (chunks.len() - 1);
        assert_eq!(covered, total);
    }

    #[test]
    fn test_fifteen_chars_size_ten_overlap_two() {
        let text = "abcdefghijklmno";
        let chunks = split_text(text, &config(10, 2)).unwrap();
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["abcdefghij", "ijklmno"]);
        assert_window_invariants(text, &chunks, 10, 2);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("This is a short text.", &config(512, 64)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "This is a short text.");
        assert_eq!(chunks[0].line_range, Some(0..0));
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(matches!(
            split_text("", &config(10, 2)),
            Err(ChunkError::EmptyInput)
        ));
        assert!(matches!(
            split_text(" \n\t ", &config(10, 2)),
            Err(ChunkError::EmptyInput)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = ChunkConfig {
            chunk_size: 5,
            chunk_overlap: 5,
        };
        assert!(matches!(
            split_text("hello world", &bad),
            Err(ChunkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let text = format!("{}\n\n{}", "a".repeat(45), "b".repeat(40));
        let chunks = split_text(&text, &config(50, 5)).unwrap();
        assert!(chunks[0].content.ends_with("\n\n"));
        assert_window_invariants(&text, &chunks, 50, 5);
    }

    #[test]
    fn test_prefers_sentence_end_over_space() {
        let text = "The quick brown fox jumps. Over the lazy dog again and again.";
        let chunks = split_text(text, &config(30, 4)).unwrap();
        assert_eq!(chunks[0].content, "The quick brown fox jumps.");
        assert_window_invariants(text, &chunks, 30, 4);
    }

    #[test]
    fn test_long_text_invariants() {
        let text = "Word ".repeat(400);
        let chunks = split_text(&text, &config(97, 13)).unwrap();
        assert!(chunks.len() > 1);
        assert_window_invariants(&text, &chunks, 97, 13);
    }

    #[test]
    fn test_zero_overlap() {
        let text = "x".repeat(25);
        let chunks = split_text(&text, &config(10, 0)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_window_invariants(&text, &chunks, 10, 0);
    }

    #[test]
    fn test_multibyte_byte_ranges() {
        let text = "héllo wörld ünïcödé têxt ".repeat(6);
        let chunks = split_text(&text, &config(20, 3)).unwrap();
        assert_window_invariants(&text, &chunks, 20, 3);
    }

    #[test]
    fn test_line_ranges_track_newlines() {
        let text = "line one\nline two\nline three\nline four\n";
        let chunks = split_text(text, &config(20, 2)).unwrap();
        assert_eq!(chunks[0].line_range.as_ref().unwrap().start, 0);
        let last = chunks.last().unwrap().line_range.clone().unwrap();
        assert_eq!(last.end, 4);
    }

    #[test]
    fn test_deterministic() {
        let text = "Some text. More text!\nAnother line? Yes.\n\nNew paragraph here.";
        let a = split_text(text, &config(16, 4)).unwrap();
        let b = split_text(text, &config(16, 4)).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_chunker_trait() {
        let chunker = WindowChunker::new();
        assert_eq!(chunker.name(), "window");
        let chunks = chunker
            .chunk("abcdefghijklmno", &config(10, 2))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
    }
}
