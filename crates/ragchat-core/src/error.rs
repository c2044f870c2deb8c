//! Error types for the index and the RAG chain.

use thiserror::Error;

/// Rejected index mutation. The index is left unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("got {chunks} chunks but {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },
    #[error("embedding has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("chunk {0} is already in the index")]
    DuplicateChunk(String),
    #[error("embedding must not be empty")]
    EmptyEmbedding,
}

/// Failure while answering a question.
///
/// The variants separate external-service failures from local ones so
/// callers can report "the embedding service is down" differently from
/// a broken index.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("embedding service failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("language model failed: {0:#}")]
    Generation(anyhow::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl RagError {
    /// True when the failure came from an external service.
    pub fn is_upstream(&self) -> bool {
        matches!(self, RagError::Embedding(_) | RagError::Generation(_))
    }
}
