//! Index Manager: keeps the content and search indexes in step with the
//! document store.
//!
//! The mode is fixed at construction:
//!
//! - **Immediate**: every save re-parses the document and writes both
//!   indexes. A failure is logged, raises the dirty flag and is reported as
//!   [`IndexUpdate::Failed`]; it never fails the save that triggered it.
//! - **Deferred**: every save only raises the dirty flag. Nothing is written
//!   until [`IndexManager::rebuild_if_dirty`] runs a full rebuild.
//!
//! The two indexes are written one after the other, not as a pair. If the
//! process dies in between they disagree about that URL until the next save
//! of the same document or the next full rebuild.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::content_index::{ContentIndex, SqliteContentIndex};
use crate::corpus::{self, page_url, source_file};
use crate::dirty::DirtyFlag;
use crate::error::{TrellisError, TrellisResult};
use crate::frontmatter;
use crate::models::{PageRecord, RebuildReport, SearchDocument};
use crate::render::{ParagraphRenderer, Renderer};
use crate::search_index::{SearchIndex, SqliteSearchIndex};
use crate::store::{path_to_string, DocumentEntry, DocumentStore, BUNDLE_SUFFIX, DOC_EXTENSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Immediate,
    Deferred,
}

impl IndexMode {
    pub fn from_deferred(deferred: bool) -> Self {
        if deferred {
            IndexMode::Deferred
        } else {
            IndexMode::Immediate
        }
    }
}

/// What happened to the indexes after a document mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    Indexed { url: String },
    Removed { url: String },
    /// Deferred mode: dirty flag raised, no index write attempted.
    Deferred,
    /// Not an indexable document.
    Skipped,
    /// The write failed; logged and the dirty flag raised.
    Failed { error: String },
}

/// Per-garden counts from [`IndexManager::reindex_content`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexReport {
    /// `(garden slug, pages)`, root-level pages under `None`.
    pub counts: Vec<(Option<String>, usize)>,
    pub total: usize,
}

pub struct IndexManager {
    store: DocumentStore,
    content: Arc<dyn ContentIndex>,
    search: Arc<dyn SearchIndex>,
    renderer: Arc<dyn Renderer>,
    dirty: DirtyFlag,
    mode: IndexMode,
}

impl IndexManager {
    pub fn new(
        store: DocumentStore,
        content: Arc<dyn ContentIndex>,
        search: Arc<dyn SearchIndex>,
        dirty: DirtyFlag,
        mode: IndexMode,
    ) -> Self {
        Self {
            store,
            content,
            search,
            renderer: Arc::new(ParagraphRenderer),
            dirty,
            mode,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Open the SQLite indexes and dirty flag under the configured data
    /// directory.
    pub async fn open(config: &Config) -> TrellisResult<Self> {
        let store = DocumentStore::with_excludes(&config.content_dir, &config.exclude_globs)?;
        let content = SqliteContentIndex::open(&config.content_index_path()).await?;
        let search = SqliteSearchIndex::open(&config.search_index_path()).await?;
        Ok(Self::new(
            store,
            Arc::new(content),
            Arc::new(search),
            DirtyFlag::new(config.dirty_flag_path()),
            IndexMode::from_deferred(config.index.deferred),
        ))
    }

    pub fn mode(&self) -> IndexMode {
        self.mode
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn content_index(&self) -> &dyn ContentIndex {
        self.content.as_ref()
    }

    pub fn search_index(&self) -> &dyn SearchIndex {
        self.search.as_ref()
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_set()
    }

    pub fn dirty_flag(&self) -> &DirtyFlag {
        &self.dirty
    }

    /// Bring both indexes up to date with one saved document.
    ///
    /// `path` is relative to `garden`, or to the content root when `garden`
    /// is `None`. Never returns an error.
    pub async fn update_file(&self, path: &str, garden: Option<&str>) -> IndexUpdate {
        if !is_document_path(path) {
            return IndexUpdate::Skipped;
        }
        if self.mode == IndexMode::Deferred {
            return self.defer();
        }

        match self.index_one(path, garden).await {
            Ok(url) => {
                debug!(url = %url, "indexed");
                IndexUpdate::Indexed { url }
            }
            Err(e) => self.fail(path, garden, e),
        }
    }

    /// Drop one deleted document from both indexes. Never returns an error.
    pub async fn remove_file(&self, path: &str, garden: Option<&str>) -> IndexUpdate {
        if !is_document_path(path) {
            return IndexUpdate::Skipped;
        }
        if self.mode == IndexMode::Deferred {
            return self.defer();
        }

        let url = page_url(garden, path);
        let source = source_file(garden, path);
        let result = async {
            self.content.delete_page(&url).await?;
            self.content.delete_by_source(&source).await?;
            self.search.remove_document(&url).await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(url = %url, "removed from indexes");
                IndexUpdate::Removed { url }
            }
            Err(e) => self.fail(path, garden, e),
        }
    }

    async fn index_one(&self, path: &str, garden: Option<&str>) -> TrellisResult<String> {
        let url = page_url(garden, path);
        let source = source_file(garden, path);

        let (front_matter, body) = self.store.read(&source)?;
        let modified = self.store.modified(&source).ok();
        let entry = DocumentEntry {
            path: source.clone().into(),
            effective_date: frontmatter::effective_updated_date(&front_matter, modified),
            front_matter,
            body,
        };
        let mut page = corpus::index_entry(&self.store, self.renderer.as_ref(), &entry)?;
        // The caller's garden and path are authoritative.
        page.url = url.clone();
        page.garden = garden.map(str::to_string);

        let record = PageRecord::with_modified(&url, &source, &page.front_matter, modified);
        self.content.upsert(&record).await?;
        self.search.add_document(&page.search_document()).await?;
        Ok(url)
    }

    fn defer(&self) -> IndexUpdate {
        match self.dirty.set() {
            Ok(()) => IndexUpdate::Deferred,
            Err(e) => {
                warn!(error = %e, "failed to raise dirty flag");
                IndexUpdate::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn fail(&self, path: &str, garden: Option<&str>, err: TrellisError) -> IndexUpdate {
        warn!(path, garden = garden.unwrap_or(""), error = %err, "index update failed, marking indexes dirty");
        if let Err(e) = self.dirty.set() {
            warn!(error = %e, "failed to raise dirty flag");
        }
        IndexUpdate::Failed {
            error: err.to_string(),
        }
    }

    /// Rebuild both indexes if the dirty flag is set. A clean index costs
    /// only the flag check.
    pub async fn rebuild_if_dirty(&self) -> TrellisResult<RebuildReport> {
        if !self.dirty.is_set() {
            return Ok(RebuildReport {
                rebuilt: false,
                count: 0,
            });
        }
        let count = self.rebuild().await?;
        Ok(RebuildReport {
            rebuilt: true,
            count,
        })
    }

    /// Replace both indexes with the current document tree and clear the
    /// dirty flag. Returns the number of pages indexed.
    ///
    /// The flag is claimed before the walk, so a save that raises it while
    /// the rebuild runs leaves it raised afterwards.
    pub async fn rebuild(&self) -> TrellisResult<usize> {
        self.dirty.claim()?;
        match self.replace_indexes().await {
            Ok(count) => {
                self.dirty.release()?;
                info!(count, "indexes rebuilt");
                Ok(count)
            }
            Err(err) => {
                if let Err(e) = self.dirty.restore() {
                    warn!(error = %e, "failed to raise dirty flag");
                }
                Err(err)
            }
        }
    }

    async fn replace_indexes(&self) -> TrellisResult<usize> {
        let pages = corpus::collect_pages(&self.store, self.renderer.as_ref())?;
        let root = Some(self.store.root());
        let records: Vec<PageRecord> = pages.iter().map(|p| p.record(root)).collect();
        let docs: Vec<SearchDocument> = pages.iter().map(|p| p.search_document()).collect();

        let count = self.content.replace_all(&records).await?;
        self.search.replace_all(&docs).await?;
        Ok(count)
    }

    /// Re-upsert every page into the content index only, optionally clearing
    /// it first.
    pub async fn reindex_content(&self, clear: bool) -> TrellisResult<ReindexReport> {
        if clear {
            self.content.clear().await?;
        }
        let root: Option<&Path> = Some(self.store.root());
        let mut report = ReindexReport::default();

        let mut root_count = 0;
        for entry in self.store.root_documents()? {
            let rel = path_to_string(&entry.path);
            self.content
                .upsert_page(&page_url(None, &rel), &rel, &entry.front_matter, root)
                .await?;
            root_count += 1;
        }
        report.counts.push((None, root_count));
        report.total += root_count;

        for garden in self.store.gardens()? {
            let mut count = 0;
            for entry in self.store.list(&garden.slug, true)? {
                let Some(doc) = entry.document() else {
                    continue;
                };
                let (garden_slug, rel) = corpus::locate(&doc.path);
                let url = page_url(garden_slug.as_deref(), &rel);
                let source = path_to_string(&doc.path);
                self.content
                    .upsert_page(&url, &source, &doc.front_matter, root)
                    .await?;
                count += 1;
            }
            report.counts.push((Some(garden.slug), count));
            report.total += count;
        }

        info!(total = report.total, "content index reindexed");
        Ok(report)
    }
}

fn is_document_path(path: &str) -> bool {
    let trimmed = path.trim_end_matches('/');
    trimmed.ends_with(BUNDLE_SUFFIX)
        || Path::new(trimmed).extension().and_then(|e| e.to_str()) == Some(DOC_EXTENSION)
}
