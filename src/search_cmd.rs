//! `trellis search ...` commands.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::index_cmd::open_indexes;
use crate::search_index::{self, SearchIndex};

pub async fn run_search_rebuild(config: &Config) -> Result<()> {
    let indexes = open_indexes(config).await?;

    println!("Rebuilding search index from: {}", config.content_dir.display());
    println!("Index location: {}", config.search_index_path().display());
    println!();

    let manager = &indexes.manager;
    let count = search_index::rebuild_index(
        indexes.search.as_ref(),
        manager.store(),
        manager.renderer(),
    )
    .await
    .context("Error rebuilding search index")?;
    println!("Successfully indexed {} documents", count);

    indexes.close().await;
    Ok(())
}

/// Run a query and print ranked hits, or the outcome as JSON with `json`.
pub async fn run_search_query(
    config: &Config,
    query: &str,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(config.search.default_limit);
    if limit < 1 {
        anyhow::bail!("--limit must be >= 1");
    }

    let indexes = open_indexes(config).await?;
    let outcome = indexes.search.search(query, limit).await;
    indexes.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    if let Some(error) = outcome.error {
        println!("{}", error);
        return Ok(());
    }
    if outcome.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in outcome.results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.title);
        println!("    url: {}", hit.url);
        println!("    source: {}", hit.source_file);
        if !hit.snippet.is_empty() {
            println!("    > {}", hit.snippet);
        }
        println!();
    }
    Ok(())
}
