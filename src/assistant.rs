//! The assistant: owns the index lifecycle and answers questions.
//!
//! ```text
//!  ingest_paths / ingest_uploads ──▶ loader ──▶ ingest ──▶ FlatIndex ──▶ store::persist
//!  ask ──▶ RagChain (embed, search, compose, generate) ──▶ Answer
//! ```
//!
//! State is [`PipelineState::Uninitialized`] while the index is empty and
//! [`PipelineState::Ready`] once it holds entries. Queries and session
//! resets never change it; [`Assistant::clear_index`] returns to
//! `Uninitialized`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use ragchat_core::chunk::Chunker;
use ragchat_core::embedding::Embedder;
use ragchat_core::error::RagError;
use ragchat_core::index::{DocumentSummary, FlatIndex, VectorIndex};
use ragchat_core::llm::LanguageModel;
use ragchat_core::models::{Answer, ConversationTurn, PipelineState};
use ragchat_core::rag::RagChain;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::{self, IngestReport};
use crate::llm::create_language_model;
use crate::loader::{self, LoadOutcome};
use crate::store;

/// Index overview for `stats` and `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub state: PipelineState,
    pub entries: usize,
    pub dims: Option<usize>,
    pub embedding_model: String,
    pub llm_model: String,
    pub index_dir: PathBuf,
    pub documents: Vec<DocumentSummary>,
}

pub struct Assistant {
    config: Config,
    chunker: Chunker,
    embedder: Box<dyn Embedder>,
    llm: Box<dyn LanguageModel>,
    index: FlatIndex,
}

impl Assistant {
    /// Build providers from `config` and load the persisted index, if any.
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_language_model(&config.llm)?;
        Self::with_providers(config, embedder, llm).await
    }

    /// Like [`open`](Self::open) with explicit providers.
    pub async fn with_providers(
        config: Config,
        embedder: Box<dyn Embedder>,
        llm: Box<dyn LanguageModel>,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;

        let index = if store::exists(&config.index.dir) {
            let expected = config.embedding.is_enabled().then(|| store::ExpectedEmbedding {
                model: embedder.model_name(),
                dims: embedder.dims(),
            });
            let index = store::load(&config.index.dir, expected).await?;
            info!(
                dir = %config.index.dir.display(),
                entries = index.len(),
                "loaded index"
            );
            index
        } else {
            FlatIndex::new()
        };

        Ok(Self {
            config,
            chunker,
            embedder,
            llm,
            index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::for_len(self.index.len())
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            state: self.state(),
            entries: self.index.len(),
            dims: self.index.dims(),
            embedding_model: self.embedder.model_name().to_string(),
            llm_model: self.llm.model_name().to_string(),
            index_dir: self.config.index.dir.clone(),
            documents: self.index.documents(),
        }
    }

    /// Load and chunk `paths` without embedding or touching the index.
    pub fn plan_paths(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let outcome = loader::load_paths(paths, &self.config.ingest.include_globs)?;
        Ok(ingest::plan(&self.chunker, outcome))
    }

    /// Ingest files and directories, then persist the index.
    pub async fn ingest_paths(&mut self, paths: &[PathBuf]) -> Result<IngestReport> {
        let outcome = loader::load_paths(paths, &self.config.ingest.include_globs)?;
        self.ingest_documents(outcome).await
    }

    /// Ingest uploaded `(file name, bytes)` pairs, then persist the index.
    pub async fn ingest_uploads(&mut self, files: Vec<(String, Vec<u8>)>) -> Result<IngestReport> {
        self.ingest_documents(loader::load_uploads(files)).await
    }

    /// Chunk, embed and index already-loaded documents, then persist.
    ///
    /// Embedding failures come back as a [`RagError`] inside the
    /// `anyhow::Error`, so callers can tell them apart with `downcast_ref`.
    /// When persisting fails the new entries are dropped again, so memory
    /// and disk hold the same index.
    pub async fn ingest_documents(&mut self, outcome: LoadOutcome) -> Result<IngestReport> {
        let before = self.index.len();
        let report = ingest::ingest_documents(
            &mut self.index,
            &self.chunker,
            self.embedder.as_ref(),
            self.config.embedding.batch_size,
            outcome,
        )
        .await?;

        if report.chunks_indexed > 0 {
            if let Err(e) =
                store::persist(&self.config.index.dir, &self.index, self.embedder.model_name()).await
            {
                warn!(entries = report.chunks_indexed, "persist failed, rolling back ingest");
                self.index.truncate(before);
                return Err(e);
            }
        }
        Ok(report)
    }

    /// Answer a question against the current index.
    pub async fn ask(&self, question: &str, history: &[ConversationTurn]) -> Result<Answer, RagError> {
        let chain = RagChain::new(
            self.embedder.as_ref(),
            self.llm.as_ref(),
            &self.index,
            self.config.rag_settings(),
        );
        chain.answer(question, history).await
    }

    /// Drop every entry and delete the persisted index.
    ///
    /// Returns whether a persisted index was removed.
    pub fn clear_index(&mut self) -> Result<bool> {
        self.index.clear();
        let removed = store::remove(&self.config.index.dir)?;
        info!(dir = %self.config.index.dir.display(), removed, "index cleared");
        Ok(removed)
    }

    /// Ingest `ingest.bootstrap_dir` when nothing has been persisted yet.
    ///
    /// Returns `None` when there was nothing to do.
    pub async fn bootstrap(&mut self) -> Result<Option<IngestReport>> {
        if store::exists(&self.config.index.dir) || !self.index.is_empty() {
            return Ok(None);
        }
        let Some(dir) = self.config.ingest.bootstrap_dir.clone() else {
            return Ok(None);
        };
        if !dir.is_dir() {
            return Ok(None);
        }

        info!(dir = %dir.display(), "bootstrapping index from default documents");
        let report = self
            .ingest_paths(&[dir.clone()])
            .await
            .with_context(|| format!("Failed to ingest bootstrap directory {}", dir.display()))?;
        Ok(Some(report))
    }
}
