//! # ragchat
//!
//! A document question-answering assistant. Ingest PDF, TXT, DOCX and
//! Markdown files; ask questions; get answers grounded in the retrieved
//! passages, with the source documents attached.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────┐
//! │   Loader    │──▶│   Pipeline   │──▶│   FlatIndex    │──▶ index.sqlite
//! │ PDF/DOCX/.. │   │ Chunk+Embed  │   │ cosine, top-k  │
//! └─────────────┘   └──────────────┘   └───────┬────────┘
//!                                              │
//!                     ┌────────────────────────┤
//!                     ▼                        ▼
//!                ┌──────────┐            ┌──────────┐
//!                │   CLI    │            │   HTTP   │
//!                │(ragchat) │            │  (axum)  │
//!                └──────────┘            └──────────┘
//! ```
//!
//! The runtime-agnostic pieces (models, chunker, index, prompt, RAG chain)
//! live in the `ragchat-core` crate; this crate adds configuration, file
//! loading, HTTP-backed providers, persistence, the CLI and the server.
//!
//! ## Quick Start
//!
//! ```bash
//! ragchat ingest ./docs           # load, chunk, embed, persist
//! ragchat ask "What is the refund policy?"
//! ragchat chat                    # interactive, with history
//! ragchat serve                   # HTTP API on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`loader`] | Paths and uploads to documents |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language model providers |
//! | [`store`] | Index persistence |
//! | [`ingest`] | Ingestion pipeline |
//! | [`assistant`] | Index lifecycle and queries |
//! | [`session`] | Per-session conversation history |
//! | [`server`] | HTTP API |
//! | [`whatsapp`] | WhatsApp Cloud API channel |

pub mod assistant;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;
pub mod whatsapp;
