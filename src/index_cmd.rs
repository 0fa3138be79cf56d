//! `trellis index ...` and `trellis init` commands.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::content_index::SqliteContentIndex;
use crate::dirty::DirtyFlag;
use crate::index_manager::{IndexManager, IndexMode};
use crate::migrate;
use crate::search_index::SqliteSearchIndex;
use crate::store::DocumentStore;

/// Both SQLite indexes plus a manager over them. Call
/// [`close`](OpenIndexes::close) before exiting so WAL state is flushed.
pub struct OpenIndexes {
    pub manager: IndexManager,
    pub content: Arc<SqliteContentIndex>,
    pub search: Arc<SqliteSearchIndex>,
}

impl OpenIndexes {
    pub async fn close(self) {
        self.content.close().await;
        self.search.close().await;
    }
}

pub async fn open_indexes(config: &Config) -> Result<OpenIndexes> {
    let store = DocumentStore::with_excludes(&config.content_dir, &config.exclude_globs)
        .context("Invalid paths.exclude_globs")?;
    let content = Arc::new(
        SqliteContentIndex::open(&config.content_index_path())
            .await
            .with_context(|| {
                format!("Failed to open content index: {}", config.content_index_path().display())
            })?,
    );
    let search = Arc::new(
        SqliteSearchIndex::open(&config.search_index_path())
            .await
            .with_context(|| {
                format!("Failed to open search index: {}", config.search_index_path().display())
            })?,
    );
    let manager = IndexManager::new(
        store,
        content.clone(),
        search.clone(),
        DirtyFlag::new(config.dirty_flag_path()),
        IndexMode::from_deferred(config.index.deferred),
    );
    Ok(OpenIndexes {
        manager,
        content,
        search,
    })
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Trellis data directory initialized: {}", config.data_dir.display());
    println!("  Content index: {}", config.content_index_path().display());
    println!("  Search index:  {}", config.search_index_path().display());
    Ok(())
}

/// Re-upsert every page into the content index with per-garden subtotals.
pub async fn run_index_rebuild(config: &Config, clear: bool) -> Result<()> {
    let indexes = open_indexes(config).await?;

    if clear {
        println!("Clearing existing index...");
    }
    println!("Indexing content from: {}", config.content_dir.display());
    println!("Database location: {}", config.content_index_path().display());
    println!();

    let report = indexes
        .manager
        .reindex_content(clear)
        .await
        .context("Failed to index content")?;

    for (garden, count) in &report.counts {
        match garden {
            Some(slug) => println!("Garden: {}", slug),
            None => println!("Root pages"),
        }
        println!("  Subtotal: {} pages", count);
        println!();
    }
    println!("Total indexed: {} pages", report.total);

    indexes.close().await;
    Ok(())
}

/// Full rebuild of both indexes if the dirty flag is set.
pub async fn run_index_refresh(config: &Config) -> Result<()> {
    let indexes = open_indexes(config).await?;
    let report = indexes
        .manager
        .rebuild_if_dirty()
        .await
        .context("Failed to rebuild indexes")?;

    if report.rebuilt {
        println!("Indexes were stale; rebuilt {} pages", report.count);
    } else {
        println!("Indexes are up to date");
    }

    indexes.close().await;
    Ok(())
}
