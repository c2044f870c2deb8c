use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

/// File name of the index database inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Open (creating if needed) the index database in `dir`.
pub async fn connect(dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    let options = SqliteConnectOptions::new()
        .filename(index_path(dir))
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index database in {}", dir.display()))?;

    Ok(pool)
}
