//! Content Index: URL → page metadata.
//!
//! One row per URL in the `pages` table of `trellis_content.db`. Every write
//! is a single upsert statement keyed by `url`, so re-indexing a page
//! replaces all of its fields at once and readers never see a mix of old and
//! new values.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::db;
use crate::error::TrellisResult;
use crate::frontmatter::{format_date, FrontMatter};
use crate::migrate;
use crate::models::{PageRecord, PageRow};

/// Abstract content index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](ContentIndex::upsert) | Insert or replace a page by URL |
/// | [`delete_page`](ContentIndex::delete_page) | Remove by URL (idempotent) |
/// | [`delete_by_source`](ContentIndex::delete_by_source) | Remove by source path (idempotent) |
/// | [`get_recent_pages`](ContentIndex::get_recent_pages) | Newest first |
/// | [`find_page_by_title`](ContentIndex::find_page_by_title) | Case-insensitive exact title |
/// | [`find_pages_by_title_fuzzy`](ContentIndex::find_pages_by_title_fuzzy) | Case-insensitive substring |
/// | [`find_page_by_slug`](ContentIndex::find_page_by_slug) | Exact URL, then URL suffix |
#[async_trait]
pub trait ContentIndex: Send + Sync {
    async fn upsert(&self, record: &PageRecord) -> TrellisResult<()>;

    /// Compute the effective date (with an mtime lookup under
    /// `content_root`) and upsert.
    async fn upsert_page(
        &self,
        url: &str,
        source_file: &str,
        front_matter: &FrontMatter,
        content_root: Option<&Path>,
    ) -> TrellisResult<()> {
        let record = PageRecord::new(url, source_file, front_matter, content_root);
        self.upsert(&record).await
    }

    async fn delete_page(&self, url: &str) -> TrellisResult<()>;

    async fn delete_by_source(&self, source_file: &str) -> TrellisResult<()>;

    async fn get_page(&self, url: &str) -> TrellisResult<Option<PageRow>>;

    async fn get_recent_pages(&self, limit: i64) -> TrellisResult<Vec<PageRow>>;

    /// On duplicate titles the most recently indexed row wins.
    async fn find_page_by_title(&self, title: &str) -> TrellisResult<Option<PageRow>>;

    /// Shorter titles rank first, then lexicographic.
    async fn find_pages_by_title_fuzzy(&self, title: &str, limit: i64)
        -> TrellisResult<Vec<PageRow>>;

    async fn find_page_by_slug(&self, slug: &str) -> TrellisResult<Option<PageRow>>;

    /// Every row, ordered by title.
    async fn all_pages(&self) -> TrellisResult<Vec<PageRow>>;

    async fn page_count(&self) -> TrellisResult<i64>;

    async fn clear(&self) -> TrellisResult<()>;

    /// Replace the whole index with `records` in one transaction.
    async fn replace_all(&self, records: &[PageRecord]) -> TrellisResult<usize>;
}

/// SQLite-backed content index.
pub struct SqliteContentIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteContentIndex {
    /// Open the database at `path`, creating the schema if needed.
    pub async fn open(path: &Path) -> TrellisResult<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_content(&pool).await?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const SELECT_COLUMNS: &str = "SELECT id, url, source_file, title, description, created_date, \
     published_date, updated_date, last_indexed FROM pages";

fn row_to_page(row: &SqliteRow) -> PageRow {
    PageRow {
        id: row.get("id"),
        url: row.get("url"),
        source_file: row.get("source_file"),
        title: row.get("title"),
        description: row.get("description"),
        created_date: row.get("created_date"),
        published_date: row.get("published_date"),
        updated_date: row.get("updated_date"),
        last_indexed: row.get("last_indexed"),
    }
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Case-folded title used for title lookups. SQLite's own `LOWER` only
/// folds ASCII, so folding happens here and is stored alongside the title.
pub(crate) fn fold_title(title: &str) -> String {
    title.to_lowercase()
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

async fn upsert_with<'e, E>(executor: E, record: &PageRecord, last_indexed: &str) -> TrellisResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO pages (url, source_file, title, title_folded, description,
                           created_date, published_date, updated_date, last_indexed)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(url) DO UPDATE SET
            source_file = excluded.source_file,
            title = excluded.title,
            title_folded = excluded.title_folded,
            description = excluded.description,
            created_date = excluded.created_date,
            published_date = excluded.published_date,
            updated_date = excluded.updated_date,
            last_indexed = excluded.last_indexed
        "#,
    )
    .bind(&record.url)
    .bind(&record.source_file)
    .bind(&record.title)
    .bind(record.title.as_deref().map(fold_title))
    .bind(&record.description)
    .bind(record.created_date.map(format_date))
    .bind(record.published_date.map(format_date))
    .bind(format_date(record.updated_date))
    .bind(last_indexed)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl ContentIndex for SqliteContentIndex {
    async fn upsert(&self, record: &PageRecord) -> TrellisResult<()> {
        upsert_with(&self.pool, record, &now_timestamp()).await?;
        debug!(url = %record.url, "content index upsert");
        Ok(())
    }

    async fn delete_page(&self, url: &str) -> TrellisResult<()> {
        sqlx::query("DELETE FROM pages WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_source(&self, source_file: &str) -> TrellisResult<()> {
        sqlx::query("DELETE FROM pages WHERE source_file = ?")
            .bind(source_file)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_page(&self, url: &str) -> TrellisResult<Option<PageRow>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_page))
    }

    async fn get_recent_pages(&self, limit: i64) -> TrellisResult<Vec<PageRow>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE updated_date IS NOT NULL \
             ORDER BY updated_date DESC, id DESC LIMIT ?"
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_page).collect())
    }

    async fn find_page_by_title(&self, title: &str) -> TrellisResult<Option<PageRow>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE title_folded = ? \
             ORDER BY last_indexed DESC, id DESC LIMIT 1"
        ))
        .bind(fold_title(title))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_page))
    }

    async fn find_pages_by_title_fuzzy(
        &self,
        title: &str,
        limit: i64,
    ) -> TrellisResult<Vec<PageRow>> {
        let rows = sqlx::query(&format!(
            r"{SELECT_COLUMNS} WHERE title_folded LIKE '%' || ? || '%' ESCAPE '\'
             ORDER BY LENGTH(title), title LIMIT ?"
        ))
        .bind(escape_like(&fold_title(title)))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_page).collect())
    }

    async fn find_page_by_slug(&self, slug: &str) -> TrellisResult<Option<PageRow>> {
        if slug.trim_matches('/').is_empty() {
            return Ok(None);
        }

        let exact = sqlx::query(&format!("{SELECT_COLUMNS} WHERE url = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = exact {
            return Ok(Some(row_to_page(&row)));
        }

        let suffix = sqlx::query(&format!(
            r"{SELECT_COLUMNS} WHERE url LIKE '%/' || ? ESCAPE '\'
             ORDER BY LENGTH(url), url LIMIT 1"
        ))
        .bind(escape_like(slug.trim_start_matches('/')))
        .fetch_optional(&self.pool)
        .await?;
        Ok(suffix.as_ref().map(row_to_page))
    }

    async fn all_pages(&self) -> TrellisResult<Vec<PageRow>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY title, url"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_page).collect())
    }

    async fn page_count(&self) -> TrellisResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn clear(&self) -> TrellisResult<()> {
        sqlx::query("DELETE FROM pages").execute(&self.pool).await?;
        Ok(())
    }

    async fn replace_all(&self, records: &[PageRecord]) -> TrellisResult<usize> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pages").execute(&mut *tx).await?;
        for record in records {
            upsert_with(&mut *tx, record, &now).await?;
        }
        // Records sharing a URL collapse into one row.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages")
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(count, "content index replaced");
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_fold_title_beyond_ascii() {
        assert_eq!(fold_title("Über Alles"), "über alles");
        assert_eq!(fold_title("ΣΟΦΙΑ"), fold_title("σοφια"));
    }
}
