//! # ragchat core
//!
//! Runtime-agnostic logic for ragchat: data models, the recursive
//! character chunker, the flat cosine-similarity index, prompt
//! composition, and the RAG chain that ties them together.
//!
//! External services are reached only through two narrow capability
//! traits, [`embedding::Embedder`] and [`llm::LanguageModel`]. This crate
//! contains no tokio, HTTP client, or filesystem I/O; concrete providers
//! and index persistence live in the `ragchat` app crate.
//!
//! ```text
//!  ingest:  text ──▶ Chunker ──▶ Embedder ──▶ FlatIndex
//!  query:   question ──▶ Embedder ──▶ FlatIndex::search ──▶ compose ──▶ LanguageModel
//! ```

pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod models;
pub mod offline;
pub mod prompt;
pub mod rag;
pub mod testing;
