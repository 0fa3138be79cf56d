//! Core data models shared by the content and search indexes.

use std::path::Path;
use std::time::SystemTime;

use chrono::NaiveDate;
use serde::Serialize;

use crate::frontmatter::{self, format_date, FrontMatter};
use crate::store::BUNDLE_BODY;

/// A page to be written into the content index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub url: String,
    pub source_file: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDate>,
    /// Effective date; always present once indexed.
    pub updated_date: NaiveDate,
}

impl PageRecord {
    /// Build a record, looking up the source file's mtime under
    /// `content_root` for the effective-date fallback.
    pub fn new(
        url: &str,
        source_file: &str,
        front_matter: &FrontMatter,
        content_root: Option<&Path>,
    ) -> Self {
        let modified = content_root.and_then(|root| source_mtime(root, source_file));
        Self::with_modified(url, source_file, front_matter, modified)
    }

    pub fn with_modified(
        url: &str,
        source_file: &str,
        front_matter: &FrontMatter,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            url: url.to_string(),
            source_file: source_file.to_string(),
            title: front_matter.title.clone(),
            description: front_matter.description.clone(),
            created_date: front_matter.created_date,
            published_date: front_matter.published_date,
            updated_date: frontmatter::effective_updated_date(front_matter, modified),
        }
    }
}

/// Modification time of a source file, following bundles to their body.
fn source_mtime(root: &Path, source_file: &str) -> Option<SystemTime> {
    let mut path = root.join(source_file);
    if path.is_dir() {
        path = path.join(BUNDLE_BODY);
    }
    std::fs::metadata(path).ok()?.modified().ok()
}

/// A row read back from the content index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRow {
    pub id: i64,
    pub url: String,
    pub source_file: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_date: Option<String>,
    pub published_date: Option<String>,
    pub updated_date: Option<String>,
    /// RFC 3339 UTC timestamp of the last upsert.
    pub last_indexed: String,
}

impl PageRow {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    /// Convert a record into the row it would produce.
    pub fn from_record(id: i64, record: &PageRecord, last_indexed: String) -> Self {
        Self {
            id,
            url: record.url.clone(),
            source_file: record.source_file.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            created_date: record.created_date.map(format_date),
            published_date: record.published_date.map(format_date),
            updated_date: Some(format_date(record.updated_date)),
            last_indexed,
        }
    }
}

/// A page as handed to the full-text index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDocument {
    pub url: String,
    pub source_file: String,
    pub title: String,
    pub description: String,
    /// Rendered HTML; tags are stripped before indexing.
    pub body_html: String,
    /// Garden slug, `None` for root-level pages.
    pub garden: Option<String>,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub url: String,
    pub source_file: String,
    pub title: String,
    pub description: String,
    pub garden: Option<String>,
    /// Higher is better; only relative order is meaningful.
    pub score: f64,
    pub snippet: String,
}

/// Result of a search: never an error, at worst an empty list and a message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchHit>,
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// What `rebuild_if_dirty` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub rebuilt: bool,
    pub count: usize,
}

/// A document discovered during a corpus walk, rendered and ready to index.
#[derive(Debug, Clone)]
pub struct IndexedPage {
    pub url: String,
    pub source_file: String,
    pub garden: Option<String>,
    pub front_matter: FrontMatter,
    pub html: String,
}

impl IndexedPage {
    pub fn record(&self, content_root: Option<&Path>) -> PageRecord {
        PageRecord::new(&self.url, &self.source_file, &self.front_matter, content_root)
    }

    pub fn search_document(&self) -> SearchDocument {
        SearchDocument {
            url: self.url.clone(),
            source_file: self.source_file.clone(),
            title: self.front_matter.title.clone().unwrap_or_default(),
            description: self.front_matter.description.clone().unwrap_or_default(),
            body_html: self.html.clone(),
            garden: self.garden.clone(),
        }
    }
}
