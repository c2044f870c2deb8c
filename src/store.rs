//! Index persistence.
//!
//! The index directory holds a single SQLite file, `index.sqlite`:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `index_meta` | `format_version`, `embedding_model`, `dims`, `updated_at` |
//! | `chunks` | chunk text and metadata, in insertion order (`seq`) |
//! | `embeddings` | one little-endian f32 BLOB per chunk |
//!
//! [`persist`] replaces the whole contents inside one transaction, so a
//! crash mid-write leaves the previous index intact.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use ragchat_core::embedding::{blob_to_vec, vec_to_blob};
use ragchat_core::index::{FlatIndex, IndexEntry};
use ragchat_core::models::Chunk;

use crate::db;
use crate::migrate::{self, FORMAT_VERSION};

/// Stored metadata describing a persisted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dims: Option<usize>,
    pub updated_at: Option<String>,
}

/// True when `dir` contains a persisted index.
pub fn exists(dir: &Path) -> bool {
    db::index_path(dir).is_file()
}

/// Write `index` to `dir`, replacing any previous contents.
pub async fn persist(dir: &Path, index: &FlatIndex, embedding_model: &str) -> Result<()> {
    let pool = db::connect(dir).await?;
    let result = persist_with(&pool, index, embedding_model).await;
    pool.close().await;
    result.with_context(|| format!("Failed to persist index to {}", dir.display()))
}

async fn persist_with(pool: &SqlitePool, index: &FlatIndex, embedding_model: &str) -> Result<()> {
    migrate::run_migrations(pool).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM embeddings").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;

    let dims = index.dims().map(|d| d.to_string()).unwrap_or_default();
    let updated_at = Utc::now().to_rfc3339();
    for (key, value) in [
        ("format_version", FORMAT_VERSION),
        ("embedding_model", embedding_model),
        ("dims", dims.as_str()),
        ("updated_at", updated_at.as_str()),
    ] {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    for (seq, entry) in index.entries().iter().enumerate() {
        let chunk = &entry.chunk;
        sqlx::query(
            r#"
            INSERT INTO chunks (seq, id, document_id, document_name, chunk_index, start_offset, end_offset, text, hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(seq as i64)
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(&chunk.document_name)
        .bind(chunk.chunk_index)
        .bind(chunk.start as i64)
        .bind(chunk.end as i64)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO embeddings (chunk_id, dims, embedding) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(entry.embedding.len() as i64)
            .bind(vec_to_blob(&entry.embedding))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Read the metadata of the index in `dir`.
pub async fn read_meta(dir: &Path) -> Result<IndexMeta> {
    if !exists(dir) {
        bail!("No index found in {}", dir.display());
    }
    let pool = db::connect(dir).await?;
    let result = read_meta_with(&pool).await;
    pool.close().await;
    result
}

async fn read_meta_with(pool: &SqlitePool) -> Result<IndexMeta> {
    let rows = sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(pool)
        .await
        .context("index_meta table missing or unreadable")?;

    let mut meta = IndexMeta {
        embedding_model: String::new(),
        dims: None,
        updated_at: None,
    };
    let mut version = None;
    for row in rows {
        let key: String = row.get("key");
        let value: String = row.get("value");
        match key.as_str() {
            "format_version" => version = Some(value),
            "embedding_model" => meta.embedding_model = value,
            "dims" => meta.dims = value.parse().ok(),
            "updated_at" => meta.updated_at = Some(value),
            _ => {}
        }
    }

    match version.as_deref() {
        Some(FORMAT_VERSION) => Ok(meta),
        Some(other) => bail!("Unsupported index format version: {}", other),
        None => bail!("Index metadata is missing its format version"),
    }
}

/// The embedding model a loaded index must have been built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedEmbedding<'a> {
    pub model: &'a str,
    /// Vector width; `0` when the provider does not know it up front.
    pub dims: usize,
}

/// Load the index in `dir`.
///
/// When `expected` is given, an index built with a different embedding
/// model or vector width is rejected: its vectors are not comparable with
/// the configured model's.
pub async fn load(dir: &Path, expected: Option<ExpectedEmbedding<'_>>) -> Result<FlatIndex> {
    if !exists(dir) {
        bail!("No index found in {}", dir.display());
    }
    let pool = db::connect(dir).await?;
    let result = load_with(&pool, expected).await;
    pool.close().await;
    result.with_context(|| format!("Failed to load index from {}", dir.display()))
}

async fn load_with(pool: &SqlitePool, expected: Option<ExpectedEmbedding<'_>>) -> Result<FlatIndex> {
    let meta = read_meta_with(pool).await?;
    if let Some(expected) = expected {
        check_compatible(&meta, expected)?;
    }

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.document_id, c.document_name, c.chunk_index,
               c.start_offset, c.end_offset, c.text, c.hash, e.embedding
        FROM chunks c
        JOIN embeddings e ON e.chunk_id = c.id
        ORDER BY c.seq
        "#,
    )
    .fetch_all(pool)
    .await?;

    let entries = rows
        .into_iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let start: i64 = row.get("start_offset");
            let end: i64 = row.get("end_offset");
            IndexEntry {
                chunk: Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    document_name: row.get("document_name"),
                    chunk_index: row.get("chunk_index"),
                    start: start as usize,
                    end: end as usize,
                    text: row.get("text"),
                    hash: row.get("hash"),
                },
                embedding: blob_to_vec(&blob),
            }
        })
        .collect();

    Ok(FlatIndex::from_entries(entries)?)
}

fn check_compatible(meta: &IndexMeta, expected: ExpectedEmbedding<'_>) -> Result<()> {
    if meta.embedding_model != expected.model {
        bail!(
            "Index was built with embedding model '{}' but '{}' is configured; \
             run `ragchat clear` and re-ingest",
            meta.embedding_model,
            expected.model
        );
    }
    if let Some(stored) = meta.dims {
        if expected.dims != 0 && stored != expected.dims {
            bail!(
                "Index holds {}-dimensional vectors but '{}' is configured for {}; \
                 run `ragchat clear` and re-ingest",
                stored,
                expected.model,
                expected.dims
            );
        }
    }
    Ok(())
}

/// Delete the persisted index in `dir`. Returns whether anything was removed.
///
/// Only the database files are removed; other files in `dir` are left alone.
pub fn remove(dir: &Path) -> Result<bool> {
    let path = db::index_path(dir);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path)
        .with_context(|| format!("Failed to remove {}", path.display()))?;
    for suffix in ["-wal", "-shm"] {
        let side = dir.join(format!("{}{}", db::INDEX_FILE, suffix));
        if side.exists() {
            std::fs::remove_file(&side)
                .with_context(|| format!("Failed to remove {}", side.display()))?;
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::chunk::Chunker;
    use ragchat_core::index::VectorIndex;
    use ragchat_core::offline::HashingEmbedder;
    use tempfile::TempDir;

    fn build(embedder: &HashingEmbedder) -> FlatIndex {
        let chunker = Chunker::new(40, 8).unwrap();
        let mut index = FlatIndex::new();
        for (name, text) in [
            ("a.md", "Rust is a systems language.\n\nIt has ownership and borrowing."),
            ("b.txt", "Python is dynamic. It is popular for scripting and data work."),
        ] {
            let chunks = chunker.split(&format!("{}-id", name), name, text);
            let vectors = chunks.iter().map(|c| embedder.vector(&c.text)).collect();
            index.add(chunks, vectors).unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_persist_load_same_results() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        let embedder = HashingEmbedder::new(128);
        let index = build(&embedder);

        assert!(!exists(&dir));
        persist(&dir, &index, "hash-bow").await.unwrap();
        assert!(exists(&dir));

        let loaded = load(&dir, Some(ExpectedEmbedding { model: "hash-bow", dims: 128 }))
            .await
            .unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.dims(), index.dims());
        for query in ["ownership", "scripting language", "systems"] {
            let q = embedder.vector(query);
            let a: Vec<String> = index.search(&q, 3).unwrap().into_iter().map(|h| h.chunk.id).collect();
            let b: Vec<String> = loaded.search(&q, 3).unwrap().into_iter().map(|h| h.chunk.id).collect();
            assert_eq!(a, b);
        }
        assert_eq!(loaded.entries()[0].chunk, index.entries()[0].chunk);

        let meta = read_meta(&dir).await.unwrap();
        assert_eq!(meta.embedding_model, "hash-bow");
        assert_eq!(meta.dims, Some(128));
    }

    #[tokio::test]
    async fn test_persist_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let embedder = HashingEmbedder::new(64);
        let index = build(&embedder);
        persist(tmp.path(), &index, "hash-bow").await.unwrap();
        persist(tmp.path(), &FlatIndex::new(), "hash-bow").await.unwrap();
        let loaded = load(tmp.path(), None).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_model_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let embedder = HashingEmbedder::new(64);
        persist(tmp.path(), &build(&embedder), "model-a").await.unwrap();
        let err = load(tmp.path(), Some(ExpectedEmbedding { model: "model-b", dims: 64 }))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("model-a"));
    }

    #[tokio::test]
    async fn test_dims_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let embedder = HashingEmbedder::new(64);
        persist(tmp.path(), &build(&embedder), "hash-bow").await.unwrap();

        let err = load(tmp.path(), Some(ExpectedEmbedding { model: "hash-bow", dims: 128 }))
            .await
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("64-dimensional"), "{}", message);
        assert!(message.contains("ragchat clear"), "{}", message);

        // Unknown width skips the check.
        let loaded = load(tmp.path(), Some(ExpectedEmbedding { model: "hash-bow", dims: 0 }))
            .await
            .unwrap();
        assert_eq!(loaded.dims(), Some(64));
    }

    #[tokio::test]
    async fn test_remove() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("keep.txt"), "x").unwrap();
        persist(tmp.path(), &FlatIndex::new(), "m").await.unwrap();
        assert!(remove(tmp.path()).unwrap());
        assert!(!exists(tmp.path()));
        assert!(tmp.path().join("keep.txt").exists());
        assert!(!remove(tmp.path()).unwrap());
        assert!(load(tmp.path(), None).await.is_err());
    }
}
