//! Brute-force in-memory [`VectorIndex`].
//!
//! Entries live in a `Vec` in insertion order. Search scores every entry
//! with cosine similarity, which is fast enough for the tens of thousands
//! of chunks a personal document collection produces.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::models::{Chunk, ScoredChunk};

use super::VectorIndex;

/// A stored `(embedding, chunk)` pair.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Per-document view of the index contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document_name: String,
    pub chunks: usize,
}

/// Flat cosine-similarity index.
///
/// The dimensionality is fixed by the first successful [`add`](Self::add)
/// and reset by [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct FlatIndex {
    dims: Option<usize>,
    entries: Vec<IndexEntry>,
    ids: HashSet<String>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from previously stored entries (in their original
    /// insertion order).
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self, IndexError> {
        let mut index = Self::new();
        let (chunks, embeddings) = entries
            .into_iter()
            .map(|e| (e.chunk, e.embedding))
            .unzip();
        index.add(chunks, embeddings)?;
        Ok(index)
    }

    /// Append entries. All-or-nothing: on error nothing is added.
    ///
    /// Returns the number of entries added.
    pub fn add(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<usize, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let expected = match self.dims {
            Some(d) => d,
            None => embeddings[0].len(),
        };
        if expected == 0 {
            return Err(IndexError::EmptyEmbedding);
        }

        let mut batch_ids = HashSet::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            if embedding.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
            if self.ids.contains(&chunk.id) || !batch_ids.insert(chunk.id.as_str()) {
                return Err(IndexError::DuplicateChunk(chunk.id.clone()));
            }
        }

        let added = chunks.len();
        self.dims = Some(expected);
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            self.ids.insert(chunk.id.clone());
            self.entries.push(IndexEntry { chunk, embedding });
        }
        Ok(added)
    }

    /// Dimensionality of stored vectors, `None` while empty.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Distinct documents in first-ingested order, with chunk counts.
    pub fn documents(&self) -> Vec<DocumentSummary> {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in &self.entries {
            let name = entry.chunk.document_name.as_str();
            let count = counts.entry(name).or_insert(0);
            if *count == 0 {
                order.push(name);
            }
            *count += 1;
        }
        order
            .into_iter()
            .map(|name| DocumentSummary {
                document_name: name.to_string(),
                chunks: counts[name],
            })
            .collect()
    }

    /// Drop every entry after the first `len`, undoing later adds.
    ///
    /// Truncating to zero also releases the dimensionality.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.entries.len() {
            return;
        }
        for entry in self.entries.drain(len..) {
            self.ids.remove(&entry.chunk.id);
        }
        if self.entries.is_empty() {
            self.dims = None;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
        self.dims = None;
    }
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dims {
            if query.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.embedding)))
            .collect();
        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
