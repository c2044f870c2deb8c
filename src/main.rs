//! # ragchat CLI
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat ingest <paths…>` | Load, chunk, embed and persist documents |
//! | `ragchat ask "<question>"` | One-shot answer with sources |
//! | `ragchat chat` | Interactive conversation (`/reset`, `/quit`) |
//! | `ragchat stats` | Index state and contents |
//! | `ragchat clear` | Delete the persisted index |
//! | `ragchat serve` | Start the HTTP API |
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `ragchat=info`);
//! command output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragchat::{chat, config, ingest, server, stats};

/// ragchat: chat with your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "ragchat: ask questions about your documents (PDF, TXT, DOCX, Markdown)",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files and directories into the index.
    ///
    /// Directories are walked recursively and filtered by
    /// `ingest.include_globs`. Unsupported or unreadable files are
    /// reported and skipped.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Load and chunk only; do not embed or write the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a single question.
    Ask {
        /// The question.
        question: String,
    },

    /// Start an interactive conversation.
    Chat,

    /// Show index state, size and documents.
    Stats,

    /// Delete the persisted index.
    Clear,

    /// Start the HTTP server on `server.bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragchat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; keys may come from the real environment.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest { paths, dry_run } => ingest::run_ingest(cfg, &paths, dry_run).await?,
        Commands::Ask { question } => chat::run_ask(cfg, &question).await?,
        Commands::Chat => chat::run_chat(cfg).await?,
        Commands::Stats => stats::run_stats(&cfg).await?,
        Commands::Clear => stats::run_clear(&cfg)?,
        Commands::Serve => server::run_server(cfg).await?,
    }

    Ok(())
}
