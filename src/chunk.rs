//! Sliding-window text chunker with boundary snapping.
//!
//! Splits a document's normalized text into overlapping, ordered segments
//! of at most `size` characters, with consecutive segments sharing
//! `overlap` characters. Cuts prefer a sentence end, then any whitespace,
//! inside a tolerance window at the tail of each segment; only when no
//! boundary exists there does a hard mid-word cut happen.
//!
//! Chunking is fully deterministic for identical `(text, size, overlap)`:
//! re-ingesting the same content produces the same boundaries.

use uuid::Uuid;

use crate::models::Chunk;

/// Fraction of `size` searched backwards for a natural boundary.
const BOUNDARY_TOLERANCE_DIVISOR: usize = 5;

/// Split `text` into chunks of at most `size` characters with `overlap`
/// characters shared between neighbours.
///
/// `overlap` must be strictly less than `size` (enforced by config
/// validation). Returns at least one chunk for any non-empty input; start
/// and end offsets (bytes into `text`) are each strictly increasing.
pub fn chunk_text(document_id: Uuid, text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    assert!(size > 0, "chunk size must be > 0");
    assert!(overlap < size, "overlap must be < size");

    if text.is_empty() {
        return Vec::new();
    }

    // Work in char indices, mapping back to byte offsets at the end.
    let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = char_starts.len();
    let byte_at = |char_idx: usize| -> usize {
        if char_idx >= n {
            text.len()
        } else {
            char_starts[char_idx]
        }
    };

    let tolerance = (size / BOUNDARY_TOLERANCE_DIVISOR).max(1);
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + size).min(n);
        let cut = if window_end < n {
            find_boundary(&chars, start, window_end, tolerance)
        } else {
            n
        };

        let byte_start = byte_at(start);
        let byte_end = byte_at(cut);
        chunks.push(Chunk {
            id: Uuid::new_v4(),
            document_id,
            text: text[byte_start..byte_end].to_string(),
            start_offset: byte_start,
            end_offset: byte_end,
            embedding: Vec::new(),
        });

        if cut >= n {
            break;
        }

        // Step back by the overlap, but always make forward progress so
        // start offsets stay strictly increasing.
        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }

    chunks
}

/// Pick a cut position in `(window_end - tolerance, window_end]`.
///
/// Preference order: just after a sentence terminator followed by
/// whitespace, then just after any whitespace, then a hard cut at
/// `window_end`.
fn find_boundary(chars: &[char], start: usize, window_end: usize, tolerance: usize) -> usize {
    let floor = window_end.saturating_sub(tolerance).max(start + 1);
    let mut whitespace_cut = None;

    // Scan backwards so the first acceptable boundary is the latest one.
    for i in (floor..window_end).rev() {
        let c = chars[i];
        if c.is_whitespace() {
            if is_sentence_end(chars, i) {
                return i + 1;
            }
            if whitespace_cut.is_none() {
                whitespace_cut = Some(i + 1);
            }
        }
    }

    whitespace_cut.unwrap_or(window_end)
}

/// True when the whitespace at `i` directly follows a sentence terminator.
fn is_sentence_end(chars: &[char], i: usize) -> bool {
    i > 0 && matches!(chars[i - 1], '.' | '!' | '?')
}
