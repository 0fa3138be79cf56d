//! Index statistics.
//!
//! `trellis index stats` and `trellis search stats` print a quick summary of
//! what is indexed, so it is easy to see whether a rebuild is needed.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::content_index::ContentIndex;
use crate::index_cmd::open_indexes;
use crate::search_index::SearchIndex;

pub async fn run_index_stats(config: &Config) -> Result<()> {
    let indexes = open_indexes(config).await?;
    let path = config.content_index_path();

    let total = indexes.content.page_count().await?;
    let recent = indexes
        .content
        .get_recent_pages(config.index.recent_limit)
        .await?;
    let dirty = indexes.manager.dirty_flag();

    println!("Trellis Content Index");
    println!("=====================");
    println!();
    println!("  Database:    {}", path.display());
    println!("  Size:        {}", format_bytes(file_size(&path)));
    println!("  Pages:       {}", total);
    match dirty.set_at() {
        Some(ts) if dirty.is_set() => println!("  Dirty:       yes (since {})", ts),
        _ => println!("  Dirty:       no"),
    }
    println!();

    println!("Recent updates:");
    if recent.is_empty() {
        println!("  (none)");
    }
    for page in &recent {
        println!(
            "  {} - {}",
            page.updated_date.as_deref().unwrap_or("----------"),
            page.display_title()
        );
    }

    indexes.close().await;
    Ok(())
}

pub async fn run_search_stats(config: &Config) -> Result<()> {
    let indexes = open_indexes(config).await?;
    let path = config.search_index_path();
    let count = indexes.search.document_count().await?;

    println!("Search index: {}", path.display());
    println!("Size: {}", format_bytes(file_size(&path)));
    println!("Documents indexed: {}", count);

    indexes.close().await;
    Ok(())
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
