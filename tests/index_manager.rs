//! Index Manager behaviour in both modes, plus the save/delete workflows and
//! link resolution on top of it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use trellis::content_index::{ContentIndex, SqliteContentIndex};
use trellis::dirty::DirtyFlag;
use trellis::editor::{self, SaveRequest};
use trellis::error::{TrellisError, TrellisResult};
use trellis::frontmatter::FrontMatter;
use trellis::index_manager::{IndexManager, IndexMode, IndexUpdate};
use trellis::memory::{InMemoryContentIndex, InMemorySearchIndex};
use trellis::models::{PageRecord, PageRow, SearchDocument, SearchOutcome};
use trellis::render::{self, ParagraphRenderer, Renderer};
use trellis::search_index::{SearchIndex, SqliteSearchIndex};
use trellis::store::DocumentStore;
use trellis::vcs::NoopHook;

// ============ Test doubles ============

/// Content index that counts writes and can be told to fail them.
#[derive(Default)]
struct CountingContent {
    inner: InMemoryContentIndex,
    writes: AtomicUsize,
    fail: bool,
}

impl CountingContent {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn write(&self) -> TrellisResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TrellisError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentIndex for CountingContent {
    async fn upsert(&self, record: &PageRecord) -> TrellisResult<()> {
        self.write()?;
        self.inner.upsert(record).await
    }
    async fn delete_page(&self, url: &str) -> TrellisResult<()> {
        self.write()?;
        self.inner.delete_page(url).await
    }
    async fn delete_by_source(&self, source_file: &str) -> TrellisResult<()> {
        self.write()?;
        self.inner.delete_by_source(source_file).await
    }
    async fn get_page(&self, url: &str) -> TrellisResult<Option<PageRow>> {
        self.inner.get_page(url).await
    }
    async fn get_recent_pages(&self, limit: i64) -> TrellisResult<Vec<PageRow>> {
        self.inner.get_recent_pages(limit).await
    }
    async fn find_page_by_title(&self, title: &str) -> TrellisResult<Option<PageRow>> {
        self.inner.find_page_by_title(title).await
    }
    async fn find_pages_by_title_fuzzy(
        &self,
        title: &str,
        limit: i64,
    ) -> TrellisResult<Vec<PageRow>> {
        self.inner.find_pages_by_title_fuzzy(title, limit).await
    }
    async fn find_page_by_slug(&self, slug: &str) -> TrellisResult<Option<PageRow>> {
        self.inner.find_page_by_slug(slug).await
    }
    async fn all_pages(&self) -> TrellisResult<Vec<PageRow>> {
        self.inner.all_pages().await
    }
    async fn page_count(&self) -> TrellisResult<i64> {
        self.inner.page_count().await
    }
    async fn clear(&self) -> TrellisResult<()> {
        self.write()?;
        self.inner.clear().await
    }
    async fn replace_all(&self, records: &[PageRecord]) -> TrellisResult<usize> {
        self.write()?;
        self.inner.replace_all(records).await
    }
}

#[derive(Default)]
struct CountingSearch {
    inner: InMemorySearchIndex,
    writes: AtomicUsize,
}

#[async_trait]
impl SearchIndex for CountingSearch {
    async fn add_document(&self, doc: &SearchDocument) -> TrellisResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.add_document(doc).await
    }
    async fn remove_document(&self, url: &str) -> TrellisResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_document(url).await
    }
    async fn search(&self, query: &str, limit: i64) -> SearchOutcome {
        self.inner.search(query, limit).await
    }
    async fn document_count(&self) -> TrellisResult<i64> {
        self.inner.document_count().await
    }
    async fn replace_all(&self, docs: &[SearchDocument]) -> TrellisResult<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_all(docs).await
    }
}

/// Renderer that saves a new root page and raises the dirty flag the first
/// time it is called, the way an editor save landing mid-rebuild would.
struct SaveDuringRender {
    content_dir: PathBuf,
    flag: DirtyFlag,
    fired: AtomicBool,
}

impl Renderer for SaveDuringRender {
    fn render(&self, text: &str) -> String {
        if !self.fired.swap(true, Ordering::SeqCst) {
            fs::write(self.content_dir.join("late.md"), "---\ntitle: Late\n---\nlatecomer").unwrap();
            self.flag.set().unwrap();
        }
        ParagraphRenderer.render(text)
    }
}

// ============ Fixtures ============

struct Fixture {
    tmp: TempDir,
    content: Arc<CountingContent>,
    search: Arc<CountingSearch>,
    manager: IndexManager,
}

impl Fixture {
    fn new(mode: IndexMode) -> Self {
        Self::with_content(mode, CountingContent::default())
    }

    fn with_content(mode: IndexMode, content: CountingContent) -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("content")).unwrap();
        let content = Arc::new(content);
        let search = Arc::new(CountingSearch::default());
        let content_dyn: Arc<dyn ContentIndex> = content.clone();
        let search_dyn: Arc<dyn SearchIndex> = search.clone();
        let manager = IndexManager::new(
            DocumentStore::new(tmp.path().join("content")),
            content_dyn,
            search_dyn,
            DirtyFlag::new(tmp.path().join(".index_dirty")),
            mode,
        );
        Self {
            tmp,
            content,
            search,
            manager,
        }
    }

    fn write(&self, rel: &str, text: &str) {
        let path = self.tmp.path().join("content").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn content_writes(&self) -> usize {
        self.content.writes.load(Ordering::SeqCst)
    }

    fn search_writes(&self) -> usize {
        self.search.writes.load(Ordering::SeqCst)
    }
}

// ============ Immediate mode ============

#[tokio::test]
async fn test_immediate_update_indexes_both_stores() {
    let fx = Fixture::new(IndexMode::Immediate);
    fx.write(
        "docs/getting-started.md",
        "---\ntitle: Getting Started\ndescription: First steps\n---\nPlant the first seed.",
    );

    let update = fx.manager.update_file("getting-started.md", Some("docs")).await;
    assert_eq!(
        update,
        IndexUpdate::Indexed {
            url: "/garden/docs/getting-started".into()
        }
    );

    let row = fx
        .content
        .get_page("/garden/docs/getting-started")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.title.as_deref(), Some("Getting Started"));
    assert_eq!(row.source_file, "docs/getting-started.md");
    assert!(row.updated_date.is_some());

    let outcome = fx.search.search("seed", 10).await;
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].url, "/garden/docs/getting-started");
    assert_eq!(outcome.results[0].garden.as_deref(), Some("docs"));
    assert!(!fx.manager.is_dirty());
}

#[tokio::test]
async fn test_non_document_paths_are_skipped() {
    let fx = Fixture::new(IndexMode::Immediate);
    fx.write("docs/diagram.png", "binary");

    assert_eq!(
        fx.manager.update_file("diagram.png", Some("docs")).await,
        IndexUpdate::Skipped
    );
    assert_eq!(fx.content_writes(), 0);
    assert!(!fx.manager.is_dirty());
}

#[tokio::test]
async fn test_failed_update_marks_dirty() {
    let fx = Fixture::with_content(IndexMode::Immediate, CountingContent::failing());
    fx.write("docs/a.md", "---\ntitle: A\n---\nbody");

    let update = fx.manager.update_file("a.md", Some("docs")).await;
    assert!(matches!(update, IndexUpdate::Failed { .. }), "{update:?}");
    assert!(fx.manager.is_dirty());
}

#[tokio::test]
async fn test_update_of_missing_document_fails_soft() {
    let fx = Fixture::new(IndexMode::Immediate);

    let update = fx.manager.update_file("ghost.md", Some("docs")).await;
    assert!(matches!(update, IndexUpdate::Failed { .. }));
    assert!(fx.manager.is_dirty());
}

#[tokio::test]
async fn test_remove_file() {
    let fx = Fixture::new(IndexMode::Immediate);
    fx.write("docs/a.md", "---\ntitle: A\n---\nremovable");
    fx.manager.update_file("a.md", Some("docs")).await;

    let update = fx.manager.remove_file("a.md", Some("docs")).await;
    assert_eq!(
        update,
        IndexUpdate::Removed {
            url: "/garden/docs/a".into()
        }
    );
    assert_eq!(fx.content.page_count().await.unwrap(), 0);
    assert_eq!(fx.search.document_count().await.unwrap(), 0);

    // Removing again is not an error.
    let again = fx.manager.remove_file("a.md", Some("docs")).await;
    assert!(matches!(again, IndexUpdate::Removed { .. }));
}

// ============ Deferred mode ============

#[tokio::test]
async fn test_deferred_update_only_marks_dirty() {
    let fx = Fixture::new(IndexMode::Deferred);
    fx.write("docs/a.md", "---\ntitle: A\n---\nalpha");
    fx.write("about.md", "---\ntitle: About\n---\nroot page");

    assert_eq!(fx.manager.update_file("a.md", Some("docs")).await, IndexUpdate::Deferred);
    assert_eq!(fx.manager.remove_file("old.md", Some("docs")).await, IndexUpdate::Deferred);
    assert_eq!(fx.content_writes(), 0);
    assert_eq!(fx.search_writes(), 0);
    assert!(fx.manager.is_dirty());
    assert!(fx.manager.dirty_flag().set_at().is_some());

    let report = fx.manager.rebuild_if_dirty().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.count, 2);
    assert!(!fx.manager.is_dirty());
    assert!(fx.content.get_page("/garden/docs/a").await.unwrap().is_some());
    assert!(fx.content.get_page("/page/about").await.unwrap().is_some());
    assert_eq!(fx.search.search("alpha", 10).await.results.len(), 1);
}

#[tokio::test]
async fn test_rebuild_if_dirty_is_noop_when_clean() {
    let fx = Fixture::new(IndexMode::Deferred);
    fx.write("docs/a.md", "---\ntitle: A\n---\nalpha");

    let report = fx.manager.rebuild_if_dirty().await.unwrap();
    assert!(!report.rebuilt);
    assert_eq!(report.count, 0);
    assert_eq!(fx.content_writes(), 0);
    assert_eq!(fx.search_writes(), 0);
}

#[tokio::test]
async fn test_rebuild_drops_stale_entries() {
    let fx = Fixture::new(IndexMode::Immediate);
    fx.write("docs/a.md", "---\ntitle: A\n---\nalpha");
    fx.write("docs/b.md", "---\ntitle: B\n---\nbeta");
    fx.manager.update_file("a.md", Some("docs")).await;
    fx.manager.update_file("b.md", Some("docs")).await;

    fs::remove_file(fx.tmp.path().join("content/docs/b.md")).unwrap();
    let count = fx.manager.rebuild().await.unwrap();
    assert_eq!(count, 1);
    assert!(fx.content.get_page("/garden/docs/b").await.unwrap().is_none());
    assert!(fx.search.search("beta", 10).await.results.is_empty());
}

#[tokio::test]
async fn test_save_during_rebuild_keeps_flag_raised() {
    let tmp = TempDir::new().unwrap();
    let content_dir = tmp.path().join("content");
    fs::create_dir_all(&content_dir).unwrap();
    fs::write(content_dir.join("about.md"), "---\ntitle: About\n---\nroot page").unwrap();
    let flag = DirtyFlag::new(tmp.path().join(".index_dirty"));
    flag.set().unwrap();

    let renderer = SaveDuringRender {
        content_dir: content_dir.clone(),
        flag: flag.clone(),
        fired: AtomicBool::new(false),
    };
    let manager = IndexManager::new(
        DocumentStore::new(&content_dir),
        Arc::new(InMemoryContentIndex::new()),
        Arc::new(InMemorySearchIndex::new()),
        flag,
        IndexMode::Deferred,
    )
    .with_renderer(Arc::new(renderer));

    let report = manager.rebuild_if_dirty().await.unwrap();
    assert_eq!(report.count, 1);
    assert!(manager.content_index().get_page("/page/late").await.unwrap().is_none());
    assert!(manager.is_dirty());

    // The next pass picks the late page up and finally clears the flag.
    let report = manager.rebuild_if_dirty().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.count, 2);
    assert!(manager.content_index().get_page("/page/late").await.unwrap().is_some());
    assert!(!manager.is_dirty());
}

#[tokio::test]
async fn test_failed_rebuild_leaves_flag_raised() {
    let fx = Fixture::with_content(IndexMode::Deferred, CountingContent::failing());
    fx.write("docs/a.md", "---\ntitle: A\n---\nalpha");
    fx.manager.update_file("a.md", Some("docs")).await;
    assert!(fx.manager.is_dirty());

    assert!(fx.manager.rebuild_if_dirty().await.is_err());
    assert!(fx.manager.is_dirty());
    assert!(fx.tmp.path().join(".index_dirty").exists());
    assert!(!fx.tmp.path().join(".index_dirty.rebuilding").exists());
}

#[tokio::test]
async fn test_reindex_content_counts_per_garden() {
    let fx = Fixture::new(IndexMode::Immediate);
    fx.write("about.md", "---\ntitle: About\n---\n");
    fx.write("docs/a.md", "---\ntitle: A\n---\n");
    fx.write("docs/deep/b.md", "---\ntitle: B\n---\n");
    fx.write("notes/guide.page/page.md", "---\ntitle: Guide\n---\n");

    let report = fx.manager.reindex_content(true).await.unwrap();
    assert_eq!(report.total, 4);
    assert_eq!(report.counts[0], (None, 1));
    assert!(report.counts.contains(&(Some("docs".to_string()), 2)));
    assert!(report.counts.contains(&(Some("notes".to_string()), 1)));

    let row = fx.content.get_page("/garden/docs/deep/b").await.unwrap().unwrap();
    assert_eq!(row.source_file, "docs/deep/b.md");
    assert!(fx.content.get_page("/garden/notes/guide").await.unwrap().is_some());
    // Content index only.
    assert_eq!(fx.search_writes(), 0);
}

// ============ Editor workflows ============

#[tokio::test]
async fn test_save_and_delete_document() {
    let fx = Fixture::new(IndexMode::Immediate);
    let request = SaveRequest {
        path: "compost.md".into(),
        garden: Some("docs".into()),
        front_matter: FrontMatter {
            title: Some("Compost".into()),
            ..Default::default()
        },
        body: "Turn the pile weekly.".into(),
    };

    let outcome = editor::save_document(&fx.manager, &NoopHook, request).await.unwrap();
    assert_eq!(outcome.url, "/garden/docs/compost");
    assert!(outcome.written.ends_with("docs/compost.md"));
    assert!(matches!(outcome.index, IndexUpdate::Indexed { .. }));

    let (fm, body) = fx.manager.store().read("docs/compost.md").unwrap();
    assert!(fm.updated_date.is_some());
    assert_eq!(body.trim(), "Turn the pile weekly.");
    assert_eq!(fx.search.search("pile", 10).await.results.len(), 1);

    let update = editor::delete_document(&fx.manager, &NoopHook, "compost.md", Some("docs"))
        .await
        .unwrap();
    assert!(matches!(update, IndexUpdate::Removed { .. }));
    assert!(!fx.manager.store().exists("docs/compost.md"));
    assert!(fx.content.get_page("/garden/docs/compost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_in_deferred_mode_still_writes_file() {
    let fx = Fixture::new(IndexMode::Deferred);
    let request = SaveRequest {
        path: "note.md".into(),
        garden: None,
        front_matter: FrontMatter::default(),
        body: "hello".into(),
    };

    let outcome = editor::save_document(&fx.manager, &NoopHook, request).await.unwrap();
    assert_eq!(outcome.index, IndexUpdate::Deferred);
    assert!(fx.manager.store().exists("note.md"));
    assert!(fx.manager.is_dirty());
    assert_eq!(fx.content_writes(), 0);
}

// ============ Rendering against the index ============

#[tokio::test]
async fn test_render_page_resolves_links() {
    let fx = Fixture::new(IndexMode::Immediate);
    fx.write("docs/getting-started.md", "---\ntitle: Getting Started\n---\nWelcome.");
    fx.write(
        "docs/index.md",
        "---\ntitle: Index\n---\nSee [[Getting Started]] and [[Nonexistent Page]].",
    );
    fx.manager.rebuild().await.unwrap();

    let page = render::render_page(
        fx.manager.store(),
        fx.manager.content_index(),
        &ParagraphRenderer,
        Path::new("docs/index.md"),
    )
    .await
    .unwrap();

    assert!(page
        .html
        .contains("See [Getting Started](/garden/docs/getting-started)"));
    assert!(page
        .html
        .contains("<span class=\"broken-link\">[[Nonexistent Page]]</span>"));
    assert_eq!(page.unresolved, ["Nonexistent Page"]);
}

// ============ SQLite-backed manager ============

#[tokio::test]
async fn test_sqlite_backed_round_trip() {
    let tmp = TempDir::new().unwrap();
    let content_dir = tmp.path().join("content");
    fs::create_dir_all(content_dir.join("docs")).unwrap();
    fs::write(
        content_dir.join("docs/intro.md"),
        "---\ntitle: Intro\npublished_date: 2024-01-01\n---\nThe trellis supports growth.",
    )
    .unwrap();

    let content = SqliteContentIndex::open(&tmp.path().join("trellis_content.db"))
        .await
        .unwrap();
    let search = SqliteSearchIndex::open(&tmp.path().join("search_index.db"))
        .await
        .unwrap();
    let manager = IndexManager::new(
        DocumentStore::new(&content_dir),
        Arc::new(content),
        Arc::new(search),
        DirtyFlag::new(tmp.path().join(".index_dirty")),
        IndexMode::Immediate,
    );

    manager.update_file("intro.md", Some("docs")).await;
    let row = manager
        .content_index()
        .get_page("/garden/docs/intro")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.updated_date.as_deref(), Some("2024-01-01"));

    let outcome = manager.search_index().search("growth", 10).await;
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].title, "Intro");
}

#[tokio::test]
async fn test_open_from_config() {
    let tmp = TempDir::new().unwrap();
    let mut config = trellis::config::Config::for_data_dir(tmp.path().join("data"));
    config.index.deferred = true;
    fs::create_dir_all(config.content_dir.join("docs")).unwrap();
    fs::write(config.content_dir.join("docs/a.md"), "---\ntitle: A\n---\nalpha").unwrap();

    let manager = IndexManager::open(&config).await.unwrap();
    assert_eq!(manager.mode(), IndexMode::Deferred);
    assert_eq!(manager.update_file("a.md", Some("docs")).await, IndexUpdate::Deferred);
    assert!(config.dirty_flag_path().exists());

    let report = manager.rebuild_if_dirty().await.unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(manager.content_index().page_count().await.unwrap(), 1);
    assert_eq!(manager.search_index().document_count().await.unwrap(), 1);
}
