//! Recursive character text chunker.
//!
//! Splits document text into overlapping [`Chunk`]s of at most
//! `chunk_size` characters. Boundaries prefer natural breaks: the text is
//! first cut on paragraph breaks (`\n\n`), pieces still too long are cut on
//! line breaks, then on spaces, and finally between characters.
//!
//! Every chunk is an exact slice of the input (its byte range is recorded
//! in `start`/`end`), and consecutive chunks share at most `chunk_overlap`
//! characters. Dropping each chunk's overlap with its predecessor and
//! concatenating the rest gives back the original text; see
//! [`reconstruct`].
//!
//! # Algorithm
//!
//! 1. Tile the text with atomic spans no longer than `chunk_size`, trying
//!    separators in order. A separator stays attached to the span before
//!    it, so the spans cover the text with no gaps.
//! 2. Merge consecutive spans greedily into windows of at most
//!    `chunk_size` characters.
//! 3. After emitting a window, drop spans from its front until the kept
//!    tail is no longer than `chunk_overlap` and the next span fits. The
//!    kept tail is the overlap.
//!
//! # Example
//!
//! ```rust
//! use ragchat_core::chunk::{reconstruct, Chunker};
//!
//! let chunker = Chunker::new(40, 10).unwrap();
//! let text = "First paragraph here.\n\nSecond paragraph is a bit longer than that.";
//! let chunks = chunker.split("doc-1", "notes.txt", text);
//! assert!(chunks.len() > 1);
//! assert!(chunks.iter().all(|c| c.text.chars().count() <= 40));
//! assert_eq!(reconstruct(&chunks), text);
//! ```

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Chunk;

/// Separator hierarchy, coarsest first. The empty separator splits
/// between characters.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("chunk_size must be > 0")]
    ZeroSize,
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Splits text into overlapping windows. Cheap to construct and `Copy`.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

/// Byte range of the input plus its length in characters.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    chars: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks tagged with the originating document.
    ///
    /// Returns an empty vector for empty or whitespace-only text. Chunk
    /// indices are contiguous from 0.
    pub fn split(&self, document_id: &str, document_name: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut spans = Vec::new();
        self.collect_spans(text, 0, text.len(), 0, &mut spans);

        self.merge(&spans)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                make_chunk(document_id, document_name, i as i64, start, &text[start..end])
            })
            .collect()
    }

    fn collect_spans(&self, text: &str, start: usize, end: usize, level: usize, out: &mut Vec<Span>) {
        let slice = &text[start..end];
        let chars = slice.chars().count();
        if chars <= self.chunk_size {
            out.push(Span { start, end, chars });
            return;
        }

        let sep = SEPARATORS[level];
        if sep.is_empty() {
            for (offset, ch) in slice.char_indices() {
                let s = start + offset;
                out.push(Span {
                    start: s,
                    end: s + ch.len_utf8(),
                    chars: 1,
                });
            }
            return;
        }

        let mut piece_start = start;
        for (offset, _) in slice.match_indices(sep) {
            let piece_end = start + offset + sep.len();
            self.collect_spans(text, piece_start, piece_end, level + 1, out);
            piece_start = piece_end;
        }
        if piece_start < end {
            self.collect_spans(text, piece_start, end, level + 1, out);
        }
    }

    /// Merge spans into `(start, end)` byte windows.
    fn merge(&self, spans: &[Span]) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        let mut current: VecDeque<Span> = VecDeque::new();
        let mut total = 0usize;

        for span in spans {
            if total + span.chars > self.chunk_size && !current.is_empty() {
                windows.push(window_bounds(&current));
                while total > self.chunk_overlap
                    || (total > 0 && total + span.chars > self.chunk_size)
                {
                    match current.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }
            current.push_back(*span);
            total += span.chars;
        }

        if !current.is_empty() {
            windows.push(window_bounds(&current));
        }

        windows
    }
}

fn window_bounds(spans: &VecDeque<Span>) -> (usize, usize) {
    let start = spans.front().map(|s| s.start).unwrap_or(0);
    let end = spans.back().map(|s| s.end).unwrap_or(start);
    (start, end)
}

fn make_chunk(document_id: &str, document_name: &str, index: i64, start: usize, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        document_name: document_name.to_string(),
        chunk_index: index,
        start,
        end: start + text.len(),
        text: text.to_string(),
        hash: hash_text(text),
    }
}

/// SHA-256 of `text`, hex encoded.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuild a document's text from its chunks (in index order) by dropping
/// each chunk's overlap with the previous one.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start).min(chunk.text.len());
        out.push_str(&chunk.text[skip..]);
        covered = covered.max(chunk.end);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlap_chars(prev: &Chunk, next: &Chunk) -> usize {
        if next.start >= prev.end {
            return 0;
        }
        let shared = prev.end - next.start;
        next.text[..shared].chars().count()
    }

    #[test]
    fn test_rejects_bad_settings() {
        assert_eq!(Chunker::new(0, 0).unwrap_err(), ChunkerError::ZeroSize);
        assert_eq!(
            Chunker::new(100, 100).unwrap_err(),
            ChunkerError::OverlapTooLarge {
                size: 100,
                overlap: 100
            }
        );
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let chunks = chunker.split("doc1", "a.txt", "Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].document_name, "a.txt");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 13));
    }

    #[test]
    fn test_empty_and_blank_text() {
        let chunker = Chunker::new(1000, 200).unwrap();
        assert!(chunker.split("doc1", "a.txt", "").is_empty());
        assert!(chunker.split("doc1", "a.txt", " \n\n \t").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunker = Chunker::new(20, 0).unwrap();
        let text = "para one is here.\n\npara two is here.";
        let chunks = chunker.split("doc1", "a.txt", text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "para one is here.\n\n");
        assert_eq!(chunks[1].text, "para two is here.");
    }

    #[test]
    fn test_falls_back_to_words_then_chars() {
        let chunker = Chunker::new(10, 0).unwrap();
        let chunks = chunker.split("doc1", "a.txt", "alpha beta gamma");
        assert_eq!(chunks[0].text, "alpha ");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));

        let chunks = chunker.split("doc1", "a.txt", "abcdefghijklmnopqrstuvwxyz");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[2].text, "uvwxyz");
    }

    #[test]
    fn test_sizes_and_overlap_bounded() {
        let text = (0..60)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i % 7))
            .collect::<Vec<_>>()
            .join(" ");
        let chunker = Chunker::new(120, 30).unwrap();
        let chunks = chunker.split("doc1", "a.txt", &text);
        assert!(chunks.len() > 5);
        for c in &chunks {
            assert!(c.text.chars().count() <= 120, "oversized chunk: {:?}", c.text);
        }
        let mut saw_overlap = false;
        for pair in chunks.windows(2) {
            let o = overlap_chars(&pair[0], &pair[1]);
            assert!(o <= 30);
            assert!(pair[1].end > pair[0].end);
            saw_overlap |= o > 0;
        }
        assert!(saw_overlap, "expected consecutive chunks to share text");
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = Chunker::new(40, 10).unwrap().split("doc1", "a.txt", &text);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
            assert_eq!(c.document_id, "doc1");
        }
    }

    #[test]
    fn test_reconstructs_original() {
        let samples = [
            "One.\n\nTwo two.\n\nThree three three.\nFour four four four.",
            "no separators at all just one long run of words that keeps going and going",
            "Überschrift\n\nDas Öl kostet 5 €. Naïve café résumé — ok?\n\n日本語のテキストも含まれています。",
            "trailing whitespace   \n\n\n\n   leading whitespace",
            "x",
        ];
        for (size, overlap) in [(5, 0), (8, 3), (16, 5), (25, 24), (1000, 200)] {
            let chunker = Chunker::new(size, overlap).unwrap();
            for text in samples {
                let chunks = chunker.split("doc1", "a.txt", text);
                assert_eq!(
                    reconstruct(&chunks),
                    text,
                    "size={} overlap={} text={:?}",
                    size,
                    overlap,
                    text
                );
                for c in &chunks {
                    assert_eq!(&text[c.start..c.end], c.text);
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let chunker = Chunker::new(12, 4).unwrap();
        let c1 = chunker.split("doc1", "a.txt", text);
        let c2 = chunker.split("doc1", "a.txt", text);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
