//! Splitting article bodies into bounded, overlapping chunks.
//!
//! Chunks are windows over the original text, measured in characters. Each
//! chunk is at most `max_len` long and starts exactly `overlap` characters
//! before the end of the previous one, so a sentence cut by one boundary is
//! whole in the neighbouring chunk. Boundaries prefer paragraph breaks, then
//! line breaks, then sentence ends, then spaces, and only cut mid-word when
//! the window has none of those.

use crate::error::{NewsError, Result};
use crate::models::DocumentChunk;

pub const DEFAULT_CHUNK_LEN: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    max_len: usize,
    overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_CHUNK_LEN,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(max_len: usize, overlap: usize) -> Result<Self> {
        if max_len == 0 || overlap >= max_len {
            return Err(NewsError::Config(format!(
                "chunk overlap ({overlap}) must be smaller than chunk length ({max_len})"
            )));
        }
        Ok(Self { max_len, overlap })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn split(&self, text: &str) -> Vec<DocumentChunk> {
        // Byte offset of every char boundary, including the end of the text.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut overlap = 0usize;
        loop {
            let hard_end = (start + self.max_len).min(n);
            let end = if hard_end == n {
                n
            } else {
                self.break_point(text, &bounds, start, hard_end)
            };

            chunks.push(DocumentChunk {
                index: chunks.len(),
                offset: bounds[start],
                overlap: bounds[start + overlap] - bounds[start],
                text: text[bounds[start]..bounds[end]].to_string(),
            });
            if end == n {
                break;
            }
            start = end - self.overlap;
            overlap = self.overlap;
        }
        chunks
    }

    /// The char index to end a chunk at. The chunk must extend past the
    /// overlap so the next one starts strictly later.
    fn break_point(&self, text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
        let earliest = start + self.overlap + 1;
        let window = &text[bounds[earliest]..bounds[hard_end]];
        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let cut = bounds[earliest] + pos + sep.len();
                if let Ok(idx) = bounds.binary_search(&cut) {
                    return idx;
                }
            }
        }
        hard_end
    }
}
