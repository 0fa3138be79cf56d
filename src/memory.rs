//! In-memory [`ContentIndex`] and [`SearchIndex`] implementations.
//!
//! Used as test doubles and for embedding the indexing core without SQLite.
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Search is a
//! brute-force term match with the same field weighting as the FTS5 backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::content_index::{now_timestamp, ContentIndex};
use crate::error::TrellisResult;
use crate::models::{PageRecord, PageRow, SearchDocument, SearchHit, SearchOutcome};
use crate::search_index::{strip_tags, SearchIndex, INVALID_QUERY_MESSAGE, UNTITLED};

struct StoredPage {
    row: PageRow,
    /// Monotonic upsert counter; orders "most recently indexed".
    seq: u64,
}

/// In-memory content index.
pub struct InMemoryContentIndex {
    pages: RwLock<HashMap<String, StoredPage>>,
    next_id: AtomicU64,
    seq: AtomicU64,
}

impl InMemoryContentIndex {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            seq: AtomicU64::new(1),
        }
    }

    fn sorted<F>(&self, mut filter: F) -> Vec<(PageRow, u64)>
    where
        F: FnMut(&PageRow) -> bool,
    {
        let pages = self.pages.read().unwrap();
        let mut rows: Vec<(PageRow, u64)> = pages
            .values()
            .filter(|p| filter(&p.row))
            .map(|p| (p.row.clone(), p.seq))
            .collect();
        rows.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        rows
    }
}

impl Default for InMemoryContentIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentIndex for InMemoryContentIndex {
    async fn upsert(&self, record: &PageRecord) -> TrellisResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut pages = self.pages.write().unwrap();
        let id = match pages.get(&record.url) {
            Some(existing) => existing.row.id,
            None => self.next_id.fetch_add(1, Ordering::SeqCst) as i64,
        };
        let row = PageRow::from_record(id, record, now_timestamp());
        pages.insert(record.url.clone(), StoredPage { row, seq });
        Ok(())
    }

    async fn delete_page(&self, url: &str) -> TrellisResult<()> {
        self.pages.write().unwrap().remove(url);
        Ok(())
    }

    async fn delete_by_source(&self, source_file: &str) -> TrellisResult<()> {
        self.pages
            .write()
            .unwrap()
            .retain(|_, p| p.row.source_file != source_file);
        Ok(())
    }

    async fn get_page(&self, url: &str) -> TrellisResult<Option<PageRow>> {
        Ok(self.pages.read().unwrap().get(url).map(|p| p.row.clone()))
    }

    async fn get_recent_pages(&self, limit: i64) -> TrellisResult<Vec<PageRow>> {
        let mut rows = self.sorted(|r| r.updated_date.is_some());
        rows.sort_by(|a, b| {
            b.0.updated_date
                .cmp(&a.0.updated_date)
                .then_with(|| b.0.id.cmp(&a.0.id))
        });
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(row, _)| row)
            .collect())
    }

    async fn find_page_by_title(&self, title: &str) -> TrellisResult<Option<PageRow>> {
        let needle = title.to_lowercase();
        let rows = self.sorted(|r| {
            r.title
                .as_deref()
                .map(|t| t.to_lowercase() == needle)
                .unwrap_or(false)
        });
        Ok(rows
            .into_iter()
            .max_by_key(|(_, seq)| *seq)
            .map(|(row, _)| row))
    }

    async fn find_pages_by_title_fuzzy(
        &self,
        title: &str,
        limit: i64,
    ) -> TrellisResult<Vec<PageRow>> {
        let needle = title.to_lowercase();
        let mut rows = self.sorted(|r| {
            r.title
                .as_deref()
                .map(|t| t.to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
        rows.sort_by(|a, b| {
            let (ta, tb) = (a.0.title.as_deref().unwrap_or(""), b.0.title.as_deref().unwrap_or(""));
            ta.chars().count().cmp(&tb.chars().count()).then_with(|| ta.cmp(tb))
        });
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(row, _)| row)
            .collect())
    }

    async fn find_page_by_slug(&self, slug: &str) -> TrellisResult<Option<PageRow>> {
        if slug.trim_matches('/').is_empty() {
            return Ok(None);
        }
        if let Some(row) = self.get_page(slug).await? {
            return Ok(Some(row));
        }
        let suffix = format!("/{}", slug.trim_start_matches('/'));
        let mut rows = self.sorted(|r| r.url.ends_with(&suffix));
        rows.sort_by(|a, b| a.0.url.len().cmp(&b.0.url.len()).then_with(|| a.0.url.cmp(&b.0.url)));
        Ok(rows.into_iter().next().map(|(row, _)| row))
    }

    async fn all_pages(&self) -> TrellisResult<Vec<PageRow>> {
        let mut rows = self.sorted(|_| true);
        rows.sort_by(|a, b| a.0.title.cmp(&b.0.title).then_with(|| a.0.url.cmp(&b.0.url)));
        Ok(rows.into_iter().map(|(row, _)| row).collect())
    }

    async fn page_count(&self) -> TrellisResult<i64> {
        Ok(self.pages.read().unwrap().len() as i64)
    }

    async fn clear(&self) -> TrellisResult<()> {
        self.pages.write().unwrap().clear();
        Ok(())
    }

    async fn replace_all(&self, records: &[PageRecord]) -> TrellisResult<usize> {
        self.pages.write().unwrap().clear();
        for record in records {
            self.upsert(record).await?;
        }
        Ok(self.pages.read().unwrap().len())
    }
}

struct StoredDocument {
    doc: SearchDocument,
    body_text: String,
}

/// In-memory search index.
pub struct InMemorySearchIndex {
    docs: RwLock<HashMap<String, StoredDocument>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn count_matches(haystack: &[String], term: &str) -> usize {
    haystack.iter().filter(|t| t.starts_with(term)).count()
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn add_document(&self, doc: &SearchDocument) -> TrellisResult<()> {
        let stored = StoredDocument {
            body_text: strip_tags(&doc.body_html),
            doc: doc.clone(),
        };
        self.docs.write().unwrap().insert(doc.url.clone(), stored);
        Ok(())
    }

    async fn remove_document(&self, url: &str) -> TrellisResult<()> {
        self.docs.write().unwrap().remove(url);
        Ok(())
    }

    async fn search(&self, query: &str, limit: i64) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() || limit < 1 {
            return SearchOutcome::default();
        }
        if query.matches('"').count() % 2 != 0 {
            return SearchOutcome::failed(INVALID_QUERY_MESSAGE);
        }
        let wanted: Vec<String> = query
            .split_whitespace()
            .filter(|w| !matches!(*w, "AND" | "OR" | "NOT"))
            .flat_map(terms)
            .collect();
        if wanted.is_empty() {
            return SearchOutcome::default();
        }

        let docs = self.docs.read().unwrap();
        let mut hits: Vec<SearchHit> = docs
            .values()
            .filter_map(|stored| {
                let title = terms(&stored.doc.title);
                let description = terms(&stored.doc.description);
                let body = terms(&stored.body_text);
                let mut score = 0.0;
                for term in &wanted {
                    let t = count_matches(&title, term);
                    let d = count_matches(&description, term);
                    let b = count_matches(&body, term);
                    if t + d + b == 0 {
                        return None;
                    }
                    score += (10 * t + 5 * d + b) as f64;
                }
                Some(SearchHit {
                    url: stored.doc.url.clone(),
                    source_file: stored.doc.source_file.clone(),
                    title: if stored.doc.title.trim().is_empty() {
                        UNTITLED.to_string()
                    } else {
                        stored.doc.title.clone()
                    },
                    description: stored.doc.description.clone(),
                    garden: stored.doc.garden.clone(),
                    score,
                    snippet: stored.body_text.chars().take(160).collect(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.url.cmp(&b.url))
        });
        hits.truncate(limit as usize);
        SearchOutcome {
            results: hits,
            error: None,
        }
    }

    async fn document_count(&self) -> TrellisResult<i64> {
        Ok(self.docs.read().unwrap().len() as i64)
    }

    async fn replace_all(&self, docs: &[SearchDocument]) -> TrellisResult<usize> {
        self.docs.write().unwrap().clear();
        for doc in docs {
            self.add_document(doc).await?;
        }
        Ok(self.docs.read().unwrap().len())
    }
}
