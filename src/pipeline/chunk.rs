//! Splitting cleaned text into bounded, speech-safe chunks.
//!
//! Synthesizers and translators work best on a few sentences at a time, so
//! the recognized text is cut into pieces of at most `max_chunk_size`
//! characters. Cut points are chosen by scanning backwards from the naive
//! cut `position + max_chunk_size`:
//!
//! 1. after the nearest `.`, `!` or `?` that is followed by whitespace, no
//!    further back than half a window;
//! 2. otherwise at the nearest whitespace, no further back than 70 % of a
//!    window;
//! 3. otherwise exactly at the naive cut (an over-long word is split rather
//!    than dropped).
//!
//! Lengths are counted in `char`s, not bytes.

use serde::{Deserialize, Serialize};

/// Default upper bound on chunk length, in characters.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 400;

const SENTENCE_LOOKBACK: f64 = 0.5;
const WHITESPACE_LOOKBACK: f64 = 0.7;

/// An ordered, trimmed, non-empty piece of the document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// 0-indexed position in the chunk sequence.
    pub index: usize,
    pub text: String,
}

/// Deterministic text splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    max_chunk_size: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_SIZE)
    }
}

impl TextChunker {
    /// `max_chunk_size` below 1 is raised to 1.
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Split `text` into chunks.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        split_chunks(text, self.max_chunk_size)
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextChunk { index, text })
            .collect()
    }
}

/// Split `text` into chunks of at most `max_chunk_size` characters.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<TextChunk> {
    TextChunker::new(max_chunk_size).chunk(text)
}

fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut pos = skip_whitespace(&chars, 0);

    while pos < len {
        if len - pos <= max {
            push_trimmed(&mut chunks, &chars[pos..]);
            break;
        }

        let cut = find_cut(&chars, pos, max);
        push_trimmed(&mut chunks, &chars[pos..cut]);
        pos = skip_whitespace(&chars, cut);
    }

    chunks
}

/// Cut index for the window starting at `pos`. Always in `(pos, pos + max]`.
fn find_cut(chars: &[char], pos: usize, max: usize) -> usize {
    let naive = pos + max;

    let sentence_floor = pos + (max as f64 * SENTENCE_LOOKBACK) as usize;
    for i in (sentence_floor..naive).rev() {
        if is_sentence_end(chars[i]) && chars[i + 1].is_whitespace() {
            return i + 1;
        }
    }

    let space_floor = pos + (max as f64 * WHITESPACE_LOOKBACK) as usize;
    for i in (space_floor..=naive).rev() {
        // `pos` never holds whitespace, so a hit here always leaves a
        // non-empty chunk.
        if i > pos && chars[i].is_whitespace() {
            return i;
        }
    }

    naive
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

fn push_trimmed(chunks: &mut Vec<String>, window: &[char]) {
    let s: String = window.iter().collect();
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
