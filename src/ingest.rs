//! Ingestion pipeline: loaded documents → chunks → embeddings → index.
//!
//! Embedding happens before anything touches the index, and all new
//! entries are added in one call, so a failed ingest leaves the index as
//! it was.

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use ragchat_core::chunk::Chunker;
use ragchat_core::embedding::{embed_batched, Embedder};
use ragchat_core::error::RagError;
use ragchat_core::index::FlatIndex;
use ragchat_core::models::Chunk;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::loader::{self, LoadOutcome, Skipped};

/// Outcome of one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub skipped: Vec<Skipped>,
}

impl IngestReport {
    /// Print the report in the CLI's line-oriented style.
    pub fn print(&self, dry_run: bool) {
        if dry_run {
            println!("Ingest plan (dry run):");
            println!("  documents: {}", self.documents_indexed);
            println!("  chunks: {}", self.chunks_indexed);
        } else {
            println!("Ingest:");
            println!("  documents indexed: {}", self.documents_indexed);
            println!("  chunks indexed: {}", self.chunks_indexed);
        }
        println!("  skipped: {}", self.skipped.len());
        for skip in &self.skipped {
            println!("    {} ({})", skip.name, skip.reason);
        }
        println!("ok");
    }
}

/// Chunk every loaded document. Documents that yield no chunks move to
/// the skip list.
fn chunk_all(chunker: &Chunker, outcome: LoadOutcome) -> (Vec<Chunk>, usize, Vec<Skipped>) {
    let mut skipped = outcome.skipped;
    let mut chunks = Vec::new();
    let mut documents = 0;
    for doc in outcome.documents {
        let doc_chunks = chunker.split(&doc.id, &doc.name, &doc.text);
        if doc_chunks.is_empty() {
            skipped.push(Skipped {
                name: doc.name,
                reason: "no extractable text".to_string(),
            });
            continue;
        }
        debug!(document = %doc.name, format = %doc.format, chunks = doc_chunks.len(), "chunked");
        documents += 1;
        chunks.extend(doc_chunks);
    }
    (chunks, documents, skipped)
}

/// Load-and-chunk only: what an ingest would add, without calling the
/// embedding service.
pub fn plan(chunker: &Chunker, outcome: LoadOutcome) -> IngestReport {
    let (chunks, documents, skipped) = chunk_all(chunker, outcome);
    IngestReport {
        documents_indexed: documents,
        chunks_indexed: chunks.len(),
        skipped,
    }
}

/// Chunk, embed and add the loaded documents to `index`.
///
/// # Errors
///
/// [`RagError::Embedding`] when the embedding service fails, and
/// [`RagError::Index`] when the vectors do not fit the index (e.g. a
/// dimensionality change). The index is unchanged in both cases.
pub async fn ingest_documents(
    index: &mut FlatIndex,
    chunker: &Chunker,
    embedder: &dyn Embedder,
    batch_size: usize,
    outcome: LoadOutcome,
) -> Result<IngestReport, RagError> {
    let (chunks, documents, skipped) = chunk_all(chunker, outcome);

    if chunks.is_empty() {
        return Ok(IngestReport {
            documents_indexed: 0,
            chunks_indexed: 0,
            skipped,
        });
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_batched(embedder, &texts, batch_size)
        .await
        .map_err(RagError::Embedding)?;

    let added = index.add(chunks, embeddings)?;

    info!(
        documents = documents,
        chunks = added,
        skipped = skipped.len(),
        total_entries = index.entries().len(),
        "ingest complete"
    );

    Ok(IngestReport {
        documents_indexed: documents,
        chunks_indexed: added,
        skipped,
    })
}

/// `ragchat ingest`: load, chunk, embed, index, persist, and print the report.
pub async fn run_ingest(config: Config, paths: &[PathBuf], dry_run: bool) -> Result<()> {
    if paths.is_empty() {
        bail!("No paths given");
    }

    if dry_run {
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let outcome = loader::load_paths(paths, &config.ingest.include_globs)?;
        plan(&chunker, outcome).print(true);
        return Ok(());
    }

    let mut assistant = Assistant::open(config).await?;
    let report = assistant.ingest_paths(paths).await?;
    report.print(false);
    println!(
        "  index: {} entries in {}",
        assistant.index().entries().len(),
        assistant.config().index.dir.display()
    );
    Ok(())
}
