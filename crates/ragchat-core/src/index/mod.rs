//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the read side the query pipeline needs:
//! top-k similarity search plus a size. [`FlatIndex`] is the in-memory
//! implementation; persisting it to disk is the app crate's job.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`FlatIndex::add`] | Append `(chunk, embedding)` entries |
//! | [`VectorIndex::search`] | Top-k chunks by cosine similarity |
//! | [`FlatIndex::documents`] | Per-document chunk counts |
//! | [`FlatIndex::clear`] | Drop every entry |

pub mod flat;

pub use flat::{DocumentSummary, FlatIndex, IndexEntry};

use crate::error::IndexError;
use crate::models::ScoredChunk;

/// Read access to a similarity index.
///
/// Implementations must be `Send + Sync` so a loaded index can be shared
/// by concurrent request handlers.
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` chunks ordered by descending similarity to
    /// `query`. Ties keep insertion order. An empty index or `k == 0`
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// [`IndexError::DimensionMismatch`] when `query` does not have the
    /// index's dimensionality.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
