//! Full-Text Search Index over page titles, descriptions and bodies.
//!
//! Backed by an SQLite FTS5 table (`pages_fts` in `search_index.db`) with
//! porter stemming. Relevance is BM25 with title matches weighted above
//! description matches, and description above body.
//!
//! [`SearchIndex::search`] never fails: malformed query syntax and storage
//! errors come back as a message in [`SearchOutcome::error`] with an empty
//! result list.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use crate::corpus;
use crate::db;
use crate::error::{TrellisError, TrellisResult};
use crate::migrate;
use crate::models::{SearchDocument, SearchHit, SearchOutcome};
use crate::render::Renderer;
use crate::store::DocumentStore;

pub const INVALID_QUERY_MESSAGE: &str = "Invalid search query. Please check your search terms. \
     Avoid special characters like quotes, parentheses, or brackets.";

pub const UNTITLED: &str = "Untitled";

/// Columns a query term may be restricted to with `column:term`.
const FILTER_COLUMNS: [&str; 3] = ["title", "description", "body"];

/// Turn free text typed into a search box into an FTS5 MATCH expression.
///
/// Each bare word becomes a quoted string, so punctuation inside words
/// (`don't`, `node.js`, `hello-world`) is handed to the tokenizer instead
/// of the query parser. Quoted phrases, `AND`/`OR`/`NOT`, grouping
/// parentheses, `column:term` filters and trailing `*` prefixes keep their
/// FTS5 meaning. Returns `None` when nothing searchable is left and
/// [`TrellisError::Query`] for an unbalanced double quote.
pub fn match_expression(query: &str) -> TrellisResult<Option<String>> {
    if query.matches('"').count() % 2 != 0 {
        return Err(TrellisError::Query("unterminated string".into()));
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut terms = 0;
    for (i, chunk) in query.split('"').enumerate() {
        if i % 2 == 1 {
            if chunk.chars().any(char::is_alphanumeric) {
                tokens.push(format!("\"{chunk}\""));
                terms += 1;
            }
            continue;
        }
        for word in chunk.split_whitespace() {
            terms += push_word(word, &mut tokens);
        }
    }

    if terms == 0 {
        return Ok(None);
    }
    Ok(Some(tokens.join(" ")))
}

/// Append the tokens for one whitespace-separated word, returning how many
/// searchable terms it contributed.
fn push_word(word: &str, tokens: &mut Vec<String>) -> usize {
    if matches!(word, "AND" | "OR" | "NOT") {
        tokens.push(word.to_string());
        return 0;
    }

    let core = word.trim_start_matches('(');
    for _ in 0..word.len() - core.len() {
        tokens.push("(".into());
    }
    // Only split closing parens off when the word has no opening one of its
    // own, so `f(x)` stays a literal.
    let (core, closing) = if core.contains('(') {
        (core, 0)
    } else {
        let trimmed = core.trim_end_matches(')');
        (trimmed, core.len() - trimmed.len())
    };

    let mut terms = 0;
    if let Some(term) = quote_term(core) {
        tokens.push(term);
        terms = 1;
    }
    for _ in 0..closing {
        tokens.push(")".into());
    }
    terms
}

fn quote_term(word: &str) -> Option<String> {
    let (column, rest) = match word.split_once(':') {
        Some((col, rest)) if FILTER_COLUMNS.contains(&col) => (Some(col), rest),
        _ => (None, word),
    };
    let (stem, prefix) = match rest.strip_suffix('*') {
        Some(stem) => (stem, "*"),
        None => (rest, ""),
    };
    if !stem.chars().any(char::is_alphanumeric) {
        return None;
    }
    let quoted = format!("\"{stem}\"{prefix}");
    Some(match column {
        Some(col) => format!("{col}:{quoted}"),
        None => quoted,
    })
}

/// Remove markup tags, collapsing the whitespace left behind.
pub fn strip_tags(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));
    tag.replace_all(html, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index a page, replacing any previous entry for the same URL.
    async fn add_document(&self, doc: &SearchDocument) -> TrellisResult<()>;

    /// Idempotent.
    async fn remove_document(&self, url: &str) -> TrellisResult<()>;

    async fn search(&self, query: &str, limit: i64) -> SearchOutcome;

    async fn document_count(&self) -> TrellisResult<i64>;

    /// Destroy the index and recreate it holding exactly `docs`.
    async fn replace_all(&self, docs: &[SearchDocument]) -> TrellisResult<usize>;
}

/// Rebuild the search index from every garden and root-level document.
pub async fn rebuild_index(
    index: &dyn SearchIndex,
    store: &DocumentStore,
    renderer: &dyn Renderer,
) -> TrellisResult<usize> {
    let pages = corpus::collect_pages(store, renderer)?;
    let docs: Vec<SearchDocument> = pages.iter().map(|p| p.search_document()).collect();
    let count = index.replace_all(&docs).await?;
    info!(count, "search index rebuilt");
    Ok(count)
}

/// SQLite FTS5-backed search index.
pub struct SqliteSearchIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteSearchIndex {
    pub async fn open(path: &Path) -> TrellisResult<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_search(&pool).await?;
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

    async fn try_search(&self, query: &str, limit: i64) -> TrellisResult<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT url, source_file, title, description, garden,
                   bm25(pages_fts, 0.0, 0.0, 10.0, 5.0, 1.0, 0.0) AS rank_score,
                   snippet(pages_fts, 4, '', '', '...', 24) AS snippet
            FROM pages_fts
            WHERE pages_fts MATCH ?
            ORDER BY rank_score
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_query_error)?;

        Ok(rows
            .iter()
            .map(|row| {
                let title: String = row.get("title");
                let rank: f64 = row.get("rank_score");
                SearchHit {
                    url: row.get("url"),
                    source_file: row.get("source_file"),
                    title: if title.trim().is_empty() {
                        UNTITLED.to_string()
                    } else {
                        title
                    },
                    description: row.get("description"),
                    garden: row.get("garden"),
                    // bm25() is lower-is-better; negate so higher is better.
                    score: -rank,
                    snippet: row.get("snippet"),
                }
            })
            .collect())
    }
}

/// Separate malformed MATCH expressions from genuine storage failures.
fn classify_query_error(err: sqlx::Error) -> TrellisError {
    if let sqlx::Error::Database(ref db_err) = err {
        let message = db_err.message();
        let is_syntax = ["fts5: syntax error", "unterminated string", "no such column", "unknown special query"]
            .iter()
            .any(|needle| message.contains(needle));
        if is_syntax {
            return TrellisError::Query(message.to_string());
        }
    }
    TrellisError::Storage(err)
}

async fn insert_with<'e, E>(executor: E, doc: &SearchDocument) -> TrellisResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO pages_fts (url, source_file, title, description, body, garden) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&doc.url)
    .bind(&doc.source_file)
    .bind(&doc.title)
    .bind(&doc.description)
    .bind(strip_tags(&doc.body_html))
    .bind(&doc.garden)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl SearchIndex for SqliteSearchIndex {
    async fn add_document(&self, doc: &SearchDocument) -> TrellisResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pages_fts WHERE url = ?")
            .bind(&doc.url)
            .execute(&mut *tx)
            .await?;
        insert_with(&mut *tx, doc).await?;
        tx.commit().await?;
        debug!(url = %doc.url, "search index add");
        Ok(())
    }

    async fn remove_document(&self, url: &str) -> TrellisResult<()> {
        sqlx::query("DELETE FROM pages_fts WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: i64) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() || limit < 1 {
            return SearchOutcome::default();
        }
        let expression = match match_expression(query) {
            Ok(Some(expression)) => expression,
            Ok(None) => return SearchOutcome::default(),
            Err(e) => {
                warn!(query, error = %e, "invalid search query");
                return SearchOutcome::failed(INVALID_QUERY_MESSAGE);
            }
        };

        match self.document_count().await {
            Ok(0) => return SearchOutcome::default(),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "search index unavailable");
                return SearchOutcome::failed(format!("Search error: {e}"));
            }
        }

        match self.try_search(&expression, limit).await {
            Ok(results) => SearchOutcome {
                results,
                error: None,
            },
            Err(TrellisError::Query(detail)) => {
                warn!(query, expression, detail = %detail, "invalid search query");
                SearchOutcome::failed(INVALID_QUERY_MESSAGE)
            }
            Err(e) => {
                warn!(query, error = %e, "search failed");
                SearchOutcome::failed(format!("Search error: {e}"))
            }
        }
    }

    async fn document_count(&self) -> TrellisResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages_fts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn replace_all(&self, docs: &[SearchDocument]) -> TrellisResult<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DROP TABLE IF EXISTS pages_fts")
            .execute(&mut *tx)
            .await?;
        sqlx::query(migrate::CREATE_PAGES_FTS)
            .execute(&mut *tx)
            .await?;
        for doc in docs {
            sqlx::query("DELETE FROM pages_fts WHERE url = ?")
                .bind(&doc.url)
                .execute(&mut *tx)
                .await?;
            insert_with(&mut *tx, doc).await?;
        }
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages_fts")
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>hello <em>world</em></p>"), "hello world");
        assert_eq!(strip_tags("<p>one</p><p>two</p>"), "one two");
        assert_eq!(strip_tags("no markup"), "no markup");
        assert_eq!(strip_tags(""), "");
    }

    fn expr(query: &str) -> String {
        match_expression(query).unwrap().unwrap()
    }

    #[test]
    fn test_match_expression_quotes_words() {
        assert_eq!(expr("hello world"), r#""hello" "world""#);
        assert_eq!(expr("don't"), r#""don't""#);
        assert_eq!(expr("node.js"), r#""node.js""#);
        assert_eq!(expr("C++ what?"), r#""C++" "what?""#);
    }

    #[test]
    fn test_match_expression_keeps_query_syntax() {
        assert_eq!(expr("\"exact phrase\" soil"), r#""exact phrase" "soil""#);
        assert_eq!(expr("compost OR mulch"), r#""compost" OR "mulch""#);
        assert_eq!(expr("(a OR b) c"), r#"( "a" OR "b" ) "c""#);
        assert_eq!(expr("grow*"), r#""grow"*"#);
        assert_eq!(expr("title:compost"), r#"title:"compost""#);
        assert_eq!(expr("url:compost"), r#""url:compost""#);
        assert_eq!(expr("f(x)"), r#""f(x)""#);
    }

    #[test]
    fn test_match_expression_nothing_searchable() {
        assert_eq!(match_expression("?? -- ...").unwrap(), None);
        assert_eq!(match_expression("\"\"").unwrap(), None);
        assert!(matches!(
            match_expression("\"unbalanced"),
            Err(TrellisError::Query(_))
        ));
    }
}
