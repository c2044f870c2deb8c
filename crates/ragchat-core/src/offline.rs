//! Offline embedding provider.
//!
//! Backs `embedding.provider = "hash"`, which lets the whole pipeline run
//! without any external service.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::embedding::Embedder;

/// Bag-of-words embedder: each lowercase alphanumeric token adds 1.0 to
/// the bucket selected by its SHA-256 prefix.
///
/// Texts sharing words get a positive cosine similarity, and the output
/// is identical across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
            ]);
            v[(bucket % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}
