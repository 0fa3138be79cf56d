use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::config::Config;
use crate::content_index::{fold_title, SqliteContentIndex};
use crate::error::TrellisResult;
use crate::search_index::SqliteSearchIndex;

pub(crate) const CREATE_PAGES_FTS: &str = r#"
    CREATE VIRTUAL TABLE pages_fts USING fts5(
        url UNINDEXED,
        source_file UNINDEXED,
        title,
        description,
        body,
        garden UNINDEXED,
        tokenize = 'porter unicode61'
    )
"#;

/// Content index schema. Idempotent.
pub async fn migrate_content(pool: &SqlitePool) -> TrellisResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            source_file TEXT NOT NULL,
            title TEXT,
            title_folded TEXT,
            description TEXT,
            created_date TEXT,
            published_date TEXT,
            updated_date TEXT,
            last_indexed TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    add_title_folded(pool).await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_updated_date ON pages(updated_date DESC)")
        .execute(pool)
        .await?;
    sqlx::query("DROP INDEX IF EXISTS idx_pages_title")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_title_folded ON pages(title_folded)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_source_file ON pages(source_file)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Databases created before `title_folded` existed get the column and a
/// backfill from `title`.
async fn add_title_folded(pool: &SqlitePool) -> TrellisResult<()> {
    let has_column: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('pages') WHERE name = 'title_folded'",
    )
    .fetch_one(pool)
    .await?;
    if has_column {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    sqlx::query("ALTER TABLE pages ADD COLUMN title_folded TEXT")
        .execute(&mut *tx)
        .await?;
    let rows = sqlx::query("SELECT id, title FROM pages WHERE title IS NOT NULL")
        .fetch_all(&mut *tx)
        .await?;
    for row in &rows {
        let id: i64 = row.get("id");
        let title: String = row.get("title");
        sqlx::query("UPDATE pages SET title_folded = ? WHERE id = ?")
            .bind(fold_title(&title))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!(rows = rows.len(), "added folded titles to content index");
    Ok(())
}

/// Search index schema. Idempotent.
pub async fn migrate_search(pool: &SqlitePool) -> TrellisResult<()> {
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='pages_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(CREATE_PAGES_FTS).execute(pool).await?;
    }

    Ok(())
}

/// Create both stores in the data directory (`trellis init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Failed to create data directory: {}", config.data_dir.display())
    })?;
    std::fs::create_dir_all(&config.content_dir).with_context(|| {
        format!("Failed to create content directory: {}", config.content_dir.display())
    })?;

    let content = SqliteContentIndex::open(&config.content_index_path())
        .await
        .context("Failed to initialize content index")?;
    content.close().await;

    let search = SqliteSearchIndex::open(&config.search_index_path())
        .await
        .context("Failed to initialize search index")?;
    search.close().await;

    Ok(())
}
