//! # Trellis CLI (`trellis`)
//!
//! Management commands for a Trellis data directory: creating the index
//! stores, rebuilding and inspecting the content and search indexes, and
//! checking cross-references.
//!
//! ## Usage
//!
//! ```bash
//! trellis --config ./config/trellis.toml <command>
//! trellis --data-dir ./data <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trellis init` | Create the content and search index stores |
//! | `trellis index rebuild [--clear]` | Re-index every page into the content index |
//! | `trellis index stats` | Page count, dirty flag and most recent pages |
//! | `trellis index refresh` | Rebuild both indexes if marked stale |
//! | `trellis search rebuild` | Recreate the search index from the content tree |
//! | `trellis search stats` | Search index document count |
//! | `trellis search query "<q>" [--json]` | Full-text search |
//! | `trellis links check` | Report unresolved `[[links]]` |
//! | `trellis gardens` | List gardens |
//! | `trellis tree <garden> [--depth N]` | Show a garden's directory tree |
//!
//! Exits with status 1 when the data directory is not configured.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trellis::config::{self, Overrides};
use trellis::{index_cmd, links_cmd, search_cmd, stats};

/// Trellis CLI: manage the content and search indexes of a digital garden.
///
/// Settings are read from the TOML file given by `--config` (optional), then
/// `TRELLIS_DATA_DIR`, `TRELLIS_CONTENT_DIR` (or the unprefixed `DATA_DIR`,
/// `CONTENT_DIR`) and `TRELLIS_DEFERRED_INDEXING`,
/// then the `--data-dir` / `--content-dir` flags.
#[derive(Parser)]
#[command(
    name = "trellis",
    about = "Trellis: content and search index management for a file-backed digital garden",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Ignored if it does not exist.
    #[arg(long, global = true, default_value = "./config/trellis.toml")]
    config: PathBuf,

    /// Data directory holding the index stores.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Content directory; defaults to `<data-dir>/content`.
    #[arg(long, global = true)]
    content_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the content and search index stores.
    ///
    /// Idempotent; running it again leaves existing indexes untouched.
    Init,

    /// Manage the content index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Manage and query the full-text search index.
    Search {
        #[command(subcommand)]
        action: SearchAction,
    },

    /// Inspect `[[links]]` between documents.
    Links {
        #[command(subcommand)]
        action: LinksAction,
    },

    /// List gardens in display order.
    Gardens,

    /// Show a garden's directory tree.
    Tree {
        /// Garden directory name.
        garden: String,

        /// Maximum directory depth; the garden itself is depth 0.
        #[arg(long)]
        depth: Option<usize>,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Re-index every page into the content index.
    Rebuild {
        /// Clear the existing index first.
        #[arg(long)]
        clear: bool,
    },
    /// Show page count, dirty flag and the most recent pages.
    Stats,
    /// Rebuild both indexes if they are marked stale.
    Refresh,
}

#[derive(Subcommand)]
enum SearchAction {
    /// Destroy and recreate the search index from the content tree.
    Rebuild,
    /// Show search index statistics.
    Stats,
    /// Run a full-text query.
    Query {
        /// Query text (FTS5 syntax: words, "phrases", AND/OR/NOT).
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LinksAction {
    /// Report link targets that resolve to nothing.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trellis=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        data_dir: cli.data_dir,
        content_dir: cli.content_dir,
    };
    let cfg = config::load_config(&cli.config, &overrides)?;

    match cli.command {
        Commands::Init => {
            index_cmd::run_init(&cfg).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Rebuild { clear } => {
                index_cmd::run_index_rebuild(&cfg, clear).await?;
            }
            IndexAction::Stats => {
                stats::run_index_stats(&cfg).await?;
            }
            IndexAction::Refresh => {
                index_cmd::run_index_refresh(&cfg).await?;
            }
        },
        Commands::Search { action } => match action {
            SearchAction::Rebuild => {
                search_cmd::run_search_rebuild(&cfg).await?;
            }
            SearchAction::Stats => {
                stats::run_search_stats(&cfg).await?;
            }
            SearchAction::Query { query, limit, json } => {
                search_cmd::run_search_query(&cfg, &query, limit, json).await?;
            }
        },
        Commands::Links { action } => match action {
            LinksAction::Check => {
                links_cmd::run_links_check(&cfg).await?;
            }
        },
        Commands::Gardens => {
            links_cmd::run_gardens(&cfg)?;
        }
        Commands::Tree { garden, depth } => {
            links_cmd::run_tree(&cfg, &garden, depth)?;
        }
    }

    Ok(())
}
