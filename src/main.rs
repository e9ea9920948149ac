//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest [PATH]` | Index a document, replacing any previous index |
//! | `docqa search "<query>"` | Print the chunks the retriever returns |
//! | `docqa chat` | Answer questions interactively |
//!
//! The API key for `chat` is read from `GOOGLE_API_KEY` (or
//! `GEMINI_API_KEY`), optionally via a `.env` file in the working directory.
//! Diagnostics go to stderr and are controlled with `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::config;
use docqa::ingest;
use docqa::search;
use docqa::session;

/// Index a single document locally and answer questions about it with a
/// tool-calling chat model.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to the TOML config file. Built-in defaults are used when it
    /// does not exist.
    #[arg(long, global = true, default_value = "./docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, embed and index a document.
    Ingest {
        /// Document to index (defaults to `source.path`).
        path: Option<PathBuf>,
    },

    /// Search the index without involving the chat model.
    Search {
        query: String,

        /// Number of chunks to return (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Start the interactive question loop.
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest { path } => {
            ingest::run_ingest(&cfg, path)?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k)?;
        }
        Commands::Chat => {
            session::run_chat(&cfg).await?;
        }
    }

    Ok(())
}
