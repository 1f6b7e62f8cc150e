//! Deterministic sliding-window chunking.
//!
//! Chunk boundaries are a pure function of the whole text and the window
//! parameters: window `i` covers characters
//! `[i * (chunk_size - overlap), i * (chunk_size - overlap) + chunk_size)`,
//! the last window may be shorter, and re-deriving the sequence at any time
//! yields byte-identical chunks at every index. There is no way to "seek"
//! without re-deriving; the iterator is cheap to restart instead.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ChunkError {
    #[error("chunk_size must be greater than zero")]
    #[diagnostic(code(vectorloom::chunk::invalid_chunk_size))]
    InvalidChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    #[diagnostic(code(vectorloom::chunk::invalid_overlap))]
    InvalidOverlap { overlap: usize, chunk_size: usize },

    #[error("cannot chunk empty text")]
    #[diagnostic(code(vectorloom::chunk::empty_text))]
    EmptyText,
}

/// Lazy iterator over `(index, chunk_text)` windows.
///
/// Finite and restartable: building it again from the same inputs yields
/// the same sequence. Windows advance by `chunk_size - overlap` characters
/// and stop once a window has reached the end of the text.
pub struct ChunkIter {
    chars: Vec<char>,
    chunk_size: usize,
    step: usize,
    start: usize,
    index: usize,
    finished: bool,
}

impl Iterator for ChunkIter {
    type Item = (usize, String);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.start >= self.chars.len() {
            return None;
        }
        let end = (self.start + self.chunk_size).min(self.chars.len());
        let text: String = self.chars[self.start..end].iter().collect();
        let index = self.index;

        if end == self.chars.len() {
            // The tail is covered; a further window would only repeat it.
            self.finished = true;
        }
        self.start += self.step;
        self.index += 1;
        Some((index, text))
    }
}

/// Split text into overlapping fixed-size windows of characters.
///
/// Validates `chunk_size > 0` and `overlap < chunk_size` before touching
/// the text; whitespace-only input is rejected so no run ever schedules
/// zero-content chunks.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<ChunkIter, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkError::InvalidOverlap {
            overlap,
            chunk_size,
        });
    }
    if text.trim().is_empty() {
        return Err(ChunkError::EmptyText);
    }
    Ok(ChunkIter {
        chars: text.chars().collect(),
        chunk_size,
        step: chunk_size - overlap,
        start: 0,
        index: 0,
        finished: false,
    })
}

/// Total number of chunks the same parameters would produce.
///
/// Derived by walking the same pure function, so the estimate and the real
/// sequence can never disagree.
pub fn estimate_chunk_count(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<usize, ChunkError> {
    Ok(chunk(text, chunk_size, overlap)?.count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, String)> {
        chunk(text, chunk_size, overlap).unwrap().collect()
    }

    #[test]
    fn sliding_windows_with_overlap() {
        // 2450 chars, chunk_size 1000, overlap 100 -> [0,1000) [900,1900) [1800,2450)
        let text: String = std::iter::repeat('a').take(2450).collect();
        let chunks = windows(&text, 1000, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].1.chars().count(), 1000);
        assert_eq!(chunks[1].1.chars().count(), 1000);
        assert_eq!(chunks[2].1.chars().count(), 650);
        assert_eq!(
            chunks.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let first = windows(&text, 100, 20);
        let second = windows(&text, 100, 20);
        assert_eq!(first, second);
    }

    #[test]
    fn exact_fit_produces_single_chunk() {
        let text: String = std::iter::repeat('x').take(1000).collect();
        let chunks = windows(&text, 1000, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1.chars().count(), 1000);
    }

    #[test]
    fn short_text_is_one_short_chunk() {
        let chunks = windows("tiny", 1000, 100);
        assert_eq!(chunks, vec![(0, "tiny".to_string())]);
    }

    #[test]
    fn overlap_repeats_window_tails() {
        let text = "abcdefghij";
        let chunks = windows(text, 4, 2);
        assert_eq!(chunks[0].1, "abcd");
        assert_eq!(chunks[1].1, "cdef");
        assert_eq!(chunks[2].1, "efgh");
        assert_eq!(chunks[3].1, "ghij");
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn zero_overlap_partitions_text() {
        let text = "abcdefghij";
        let chunks = windows(text, 4, 0);
        assert_eq!(
            chunks
                .iter()
                .map(|(_, c)| c.as_str())
                .collect::<Vec<_>>(),
            vec!["abcd", "efgh", "ij"]
        );
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllö wörld désu".repeat(10);
        for (_, piece) in chunk(&text, 7, 3).unwrap() {
            assert!(piece.chars().count() <= 7);
        }
    }

    #[test]
    fn estimate_matches_iteration() {
        let text = "0123456789".repeat(123);
        let estimated = estimate_chunk_count(&text, 37, 11).unwrap();
        assert_eq!(estimated, windows(&text, 37, 11).len());
    }

    #[test]
    fn invalid_params_rejected() {
        assert!(matches!(
            chunk("text", 0, 0),
            Err(ChunkError::InvalidChunkSize)
        ));
        assert!(matches!(
            chunk("text", 10, 10),
            Err(ChunkError::InvalidOverlap { .. })
        ));
        assert!(matches!(chunk("  \n ", 10, 2), Err(ChunkError::EmptyText)));
    }
}
