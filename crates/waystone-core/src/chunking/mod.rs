//! Sliding-window text chunking for the embedding pipeline.
//!
//! Documents longer than one chunk window are split into overlapping
//! windows so that no passage is cut off from its surrounding context.
//! Window boundaries prefer whitespace: a boundary may slide up to
//! [`CHUNK_SNAP_TOLERANCE`](crate::config::CHUNK_SNAP_TOLERANCE) of the
//! window to avoid breaking a word, but the stride never drops below one
//! character.
//!
//! Chunk order is load-bearing: the order emitted here fixes the row order
//! of the vector index for the entire pipeline.

mod types;

pub use types::TextChunk;

use crate::config::{CHUNK_SNAP_TOLERANCE, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::ConfigError;

/// Chunker configuration.
///
/// `size` and `overlap` are measured in characters. `0 < overlap < size`
/// must hold unless chunking is disabled.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target window length in characters
    pub size: usize,
    /// Characters shared between adjacent windows
    pub overlap: usize,
    /// When set, the whole document becomes a single chunk
    pub disabled: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            disabled: false,
        }
    }
}

impl ChunkerConfig {
    /// Validates the window/overlap combination.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.disabled {
            return Ok(());
        }
        if self.size == 0 {
            return Err(ConfigError::InvalidChunking(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(ConfigError::InvalidChunking(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// Splits a document body into ordered, overlapping chunks.
///
/// When chunking is disabled the whole body is returned as a single chunk.
/// Otherwise a window of `size` characters slides with stride
/// `size - overlap`; the final window is truncated to the document end and
/// emitted even when shorter, unless it would be empty.
///
/// Window boundaries snap to the nearest whitespace within ±10% of the
/// target position. Adjacent chunks always overlap, so concatenating them
/// with the shared region elided reconstructs the body exactly.
pub fn chunk_text(body: &str, config: &ChunkerConfig) -> Vec<TextChunk> {
    if body.is_empty() {
        return Vec::new();
    }

    if config.disabled || char_count(body) <= config.size {
        return vec![TextChunk {
            index: 0,
            text: body.to_string(),
            start: 0,
            end: body.len(),
        }];
    }

    // Byte offset of every char boundary, plus the end sentinel. All window
    // arithmetic below is in character positions; slicing goes through this
    // table so multi-byte text never splits inside a code point.
    let boundaries: Vec<usize> = body
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(body.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let chars: Vec<char> = body.chars().collect();
    let stride = (config.size - config.overlap).max(1);
    let tolerance = ((config.size as f32 * CHUNK_SNAP_TOLERANCE) as usize).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut prev_end = 0usize;

    loop {
        let raw_end = start + config.size;
        if raw_end >= total_chars {
            // Final chunk: truncated to the body end, kept even when short.
            if start < total_chars {
                chunks.push(make_chunk(body, &boundaries, chunks.len(), start, total_chars));
            }
            break;
        }

        let mut end = snap_to_whitespace(&chars, raw_end, tolerance).unwrap_or(raw_end);
        // Boundaries must keep advancing or the elision invariant breaks.
        end = end.clamp(prev_end + 1, total_chars);

        chunks.push(make_chunk(body, &boundaries, chunks.len(), start, end));
        prev_end = end;

        let raw_next = start + stride;
        let mut next = snap_to_whitespace(&chars, raw_next, tolerance).unwrap_or(raw_next);
        // Stride >= 1, and the next window must still overlap this one.
        next = next.clamp(start + 1, end.saturating_sub(1).max(start + 1));
        start = next;
    }

    chunks
}

/// Finds the whitespace character nearest to `target` within `tolerance`
/// positions, preferring the closest candidate on either side.
fn snap_to_whitespace(chars: &[char], target: usize, tolerance: usize) -> Option<usize> {
    if target >= chars.len() {
        return None;
    }
    for delta in 0..=tolerance {
        if target >= delta && chars[target - delta].is_whitespace() {
            return Some(target - delta);
        }
        let fwd = target + delta;
        if fwd < chars.len() && chars[fwd].is_whitespace() {
            return Some(fwd);
        }
    }
    None
}

fn make_chunk(
    body: &str,
    boundaries: &[usize],
    index: usize,
    start_char: usize,
    end_char: usize,
) -> TextChunk {
    let start = boundaries[start_char];
    let end = boundaries[end_char];
    TextChunk {
        index,
        text: body[start..end].to_string(),
        start,
        end,
    }
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}
