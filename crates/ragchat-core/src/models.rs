//! Core data models shared by the ingest and query pipelines.
//!
//! Documents flow in as extracted text, leave the chunker as [`Chunk`]s,
//! and come back out of retrieval as [`ScoredChunk`]s. Answers carry
//! [`SourceRef`]s for attribution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the chunk excerpt attached to a [`SourceRef`], in characters.
pub const EXCERPT_CHARS: usize = 200;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Txt,
    Docx,
    Markdown,
}

impl DocumentFormat {
    /// Every supported format, in a stable order.
    pub const ALL: [DocumentFormat; 4] = [
        DocumentFormat::Pdf,
        DocumentFormat::Txt,
        DocumentFormat::Docx,
        DocumentFormat::Markdown,
    ];

    /// Maps a file extension (with or without the leading dot, any case)
    /// to a format. Returns `None` for unsupported extensions.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "txt" => Some(DocumentFormat::Txt),
            "docx" => Some(DocumentFormat::Docx),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            _ => None,
        }
    }

    /// Canonical extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Txt => "txt",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A loaded document: extracted plain text plus its origin.
///
/// Lives only long enough to be chunked; the index keeps chunks, not
/// documents.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Display name, usually the file name (`"handbook.pdf"`).
    pub name: String,
    pub format: DocumentFormat,
    pub text: String,
}

/// A contiguous window of a document's text.
///
/// `text` is always the exact slice `source_text[start..end]` (byte
/// offsets), which is what makes the overlap removable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub chunk_index: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Attribution for an answer: which document a retrieved passage came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_name: String,
    pub chunk_excerpt: String,
    pub score: f32,
}

impl SourceRef {
    pub fn from_scored(scored: &ScoredChunk) -> Self {
        Self {
            document_name: scored.chunk.document_name.clone(),
            chunk_excerpt: excerpt(&scored.chunk.text, EXCERPT_CHARS),
            score: scored.score,
        }
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((byte_pos, _)) => format!("{}...", &text[..byte_pos]),
        None => text.to_string(),
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when the turn is rendered into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
}

/// Result of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Lifecycle of the assistant's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No documents ingested yet (or the index was cleared).
    Uninitialized,
    /// The index holds at least one entry.
    Ready,
}

impl PipelineState {
    pub fn for_len(entries: usize) -> Self {
        if entries == 0 {
            PipelineState::Uninitialized
        } else {
            PipelineState::Ready
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Uninitialized => f.write_str("uninitialized"),
            PipelineState::Ready => f.write_str("ready"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension(".md"), Some(DocumentFormat::Markdown));
        assert_eq!(
            DocumentFormat::from_extension("markdown"),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("xyz"), None);
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("short", 200), "short");
        assert_eq!(excerpt("héllo wörld", 4), "héll...");
        let long = "a".repeat(250);
        let e = excerpt(&long, EXCERPT_CHARS);
        assert_eq!(e.len(), 203);
        assert!(e.ends_with("..."));
    }

    #[test]
    fn excerpt_exact_length_is_not_marked() {
        let exact = "b".repeat(EXCERPT_CHARS);
        assert_eq!(excerpt(&exact, EXCERPT_CHARS), exact);
    }

    #[test]
    fn state_follows_entry_count() {
        assert_eq!(PipelineState::for_len(0), PipelineState::Uninitialized);
        assert_eq!(PipelineState::for_len(3), PipelineState::Ready);
    }
}
