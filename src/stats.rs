//! Index overview and the destructive clear.
//!
//! `ragchat stats` reads the persisted index directly, without building
//! providers, so it works even when the configured embedding model no
//! longer matches the one the index was built with.

use anyhow::Result;

use ragchat_core::index::VectorIndex;
use ragchat_core::models::PipelineState;

use crate::config::Config;
use crate::db;
use crate::store;

/// Print the index state, size and per-document chunk counts.
pub async fn run_stats(config: &Config) -> Result<()> {
    let dir = &config.index.dir;

    println!("ragchat index stats");
    println!("===================");
    println!();
    println!("  Index:       {}", dir.display());

    if !store::exists(dir) {
        println!("  State:       {}", PipelineState::Uninitialized);
        println!("  Entries:     0");
        return Ok(());
    }

    let meta = store::read_meta(dir).await?;
    let index = store::load(dir, None).await?;
    let size = std::fs::metadata(db::index_path(dir))
        .map(|m| m.len())
        .unwrap_or(0);

    println!("  Size:        {}", format_bytes(size));
    println!("  State:       {}", PipelineState::for_len(index.len()));
    println!("  Entries:     {}", index.len());
    println!(
        "  Model:       {} ({} dims)",
        meta.embedding_model,
        meta.dims.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );
    if let Some(updated) = &meta.updated_at {
        println!("  Updated:     {}", updated);
    }

    let documents = index.documents();
    if !documents.is_empty() {
        println!();
        println!("  {:<48} {:>8}", "DOCUMENT", "CHUNKS");
        println!("  {}", "-".repeat(57));
        for doc in &documents {
            println!("  {:<48} {:>8}", truncate(&doc.document_name, 48), doc.chunks);
        }
    }

    Ok(())
}

/// Delete the persisted index.
pub fn run_clear(config: &Config) -> Result<()> {
    if store::remove(&config.index.dir)? {
        println!("Index cleared: {}", config.index.dir.display());
    } else {
        println!("No index found in {}", config.index.dir.display());
    }
    println!("ok");
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars - 1).collect();
        format!("{}…", head)
    }
}
