//! Character-window chunking of extracted article text.

use crate::scraper::SourceDocument;
use serde::{Deserialize, Serialize};

/// Maximum characters per chunk.
pub const CHUNK_SIZE: usize = 4000;

/// Characters shared by consecutive chunks.
pub const CHUNK_OVERLAP: usize = 200;

/// A contiguous segment of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the source document, starting at 0
    pub index: usize,
    pub text: String,
}

/// Splits text into overlapping windows of at most `size` characters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: CHUNK_SIZE,
            overlap: CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    #[cfg(test)]
    fn with_window(size: usize, overlap: usize) -> Self {
        assert!(overlap < size, "overlap must be smaller than the window");
        Self { size, overlap }
    }

    fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Split a fetched document into ordered chunks.
    pub fn split(&self, doc: &SourceDocument) -> Vec<Chunk> {
        self.split_text(&doc.raw_text)
    }

    /// Split raw text. Whitespace-only input yields no chunks.
    pub fn split_text(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Work in characters so a window never cuts a UTF-8 sequence.
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        if len <= self.size {
            return vec![Chunk {
                index: 0,
                text: text.to_string(),
            }];
        }

        let step = self.step();
        let mut chunks = Vec::with_capacity((len - self.overlap).div_ceil(step));
        let mut start = 0;
        loop {
            let end = (start + self.size).min(len);
            chunks.push(Chunk {
                index: chunks.len(),
                text: chars[start..end].iter().collect(),
            });
            if end == len {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> SourceDocument {
        SourceDocument {
            url: "https://example.com/a".to_string(),
            title: None,
            raw_text: text.to_string(),
        }
    }

    /// Undo the overlap: all of chunk 0, then each later chunk minus its shared prefix.
    fn stitch(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for chunk in chunks {
            if chunk.index == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "word ".repeat(200);
        let chunks = Chunker::default().split(&doc(&text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn text_at_exact_window_is_a_single_chunk() {
        let text = "x".repeat(CHUNK_SIZE);
        assert_eq!(Chunker::default().split_text(&text).len(), 1);
    }

    #[test]
    fn long_text_covers_source_with_overlap() {
        let chunker = Chunker::with_window(10, 3);
        let text: String = ('a'..='z').collect();
        let chunks = chunker.split_text(&text);

        // ceil((26 - 3) / 7) = 4
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
        assert_eq!(stitch(&chunks, 3), text);
    }

    #[test]
    fn chunk_count_follows_effective_step() {
        let chunker = Chunker::default();
        for len in [4001usize, 7800, 7801, 12_345, 40_000] {
            let text = "y".repeat(len);
            let chunks = chunker.split_text(&text);
            let expected = (len - CHUNK_OVERLAP).div_ceil(CHUNK_SIZE - CHUNK_OVERLAP);
            assert_eq!(chunks.len(), expected, "len {len}");
            assert_eq!(stitch(&chunks, CHUNK_OVERLAP), text);
        }
    }

    #[test]
    fn indices_are_sequential() {
        let chunks = Chunker::with_window(5, 1).split_text(&"z".repeat(30));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(25);
        let chunks = Chunker::with_window(10, 2).split_text(&text);
        assert_eq!(stitch(&chunks, 2), text);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(Chunker::default().split_text("").is_empty());
        assert!(Chunker::default().split_text("  \n\n\t ").is_empty());
    }
}
