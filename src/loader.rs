//! Document loading: paths and uploaded bytes to [`Document`]s.
//!
//! A file that cannot be loaded is recorded in the skip list with a
//! reason; it never aborts the rest of the batch.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;
use walkdir::WalkDir;

use ragchat_core::models::{Document, DocumentFormat};

use crate::extract::{extract_text, ExtractError};

/// Directories never descended into when walking.
const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// A document that was not indexed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub skipped: Vec<Skipped>,
}

impl LoadOutcome {
    fn skip(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        let skipped = Skipped {
            name: name.into(),
            reason: reason.into(),
        };
        warn!(document = %skipped.name, reason = %skipped.reason, "skipping document");
        self.skipped.push(skipped);
    }
}

/// Build a document from raw bytes; the format comes from `name`'s extension.
pub fn load_bytes(name: &str, bytes: &[u8]) -> Result<Document, ExtractError> {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let format = DocumentFormat::from_extension(&ext).ok_or_else(|| {
        if ext.is_empty() {
            ExtractError::UnsupportedFormat("(no extension)".to_string())
        } else {
            ExtractError::UnsupportedFormat(format!(".{}", ext))
        }
    })?;
    let text = extract_text(bytes, format)?;
    Ok(Document {
        id: Uuid::new_v4().to_string(),
        name: display_name(name),
        format,
        text,
    })
}

/// Load a batch of uploaded `(name, bytes)` pairs.
pub fn load_uploads(files: Vec<(String, Vec<u8>)>) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();
    for (name, bytes) in files {
        match load_bytes(&name, &bytes) {
            Ok(doc) => outcome.documents.push(doc),
            Err(e) => outcome.skip(display_name(&name), e.to_string()),
        }
    }
    outcome
}

/// Load files and directories. Directories are expanded with
/// [`collect_directory`]; explicitly named files are loaded regardless of
/// the include globs.
pub fn load_paths(paths: &[PathBuf], include_globs: &[String]) -> Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();
    for path in paths {
        if path.is_dir() {
            for file in collect_directory(path, include_globs)? {
                load_file(&file, &mut outcome);
            }
        } else if path.is_file() {
            load_file(path, &mut outcome);
        } else {
            outcome.skip(path.display().to_string(), "file not found");
        }
    }
    Ok(outcome)
}

fn load_file(path: &Path, outcome: &mut LoadOutcome) {
    let name = display_name(&path.to_string_lossy());
    match std::fs::read(path) {
        Ok(bytes) => match load_bytes(&name, &bytes) {
            Ok(doc) => outcome.documents.push(doc),
            Err(e) => outcome.skip(name, e.to_string()),
        },
        Err(e) => outcome.skip(name, format!("read failed: {}", e)),
    }
}

/// Files under `dir` whose relative path matches `include_globs`, sorted.
pub fn collect_directory(dir: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    let include_set = build_globset(include_globs)?;
    let excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

/// Final path component, so uploads cannot smuggle directories into names.
fn display_name(name: &str) -> String {
    let trimmed = name.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}
