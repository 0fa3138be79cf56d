//! Document Store: read/write access to the content tree.
//!
//! Paths handed to the store are relative to the content root. A document is
//! either a single `.md` file or a bundle directory (`name.page/`) whose body
//! lives in a fixed `page.md` inside it. Any other directory is a garden.
//!
//! ```text
//! content/
//! ├── about.md                 root-level document
//! └── projects/                garden
//!     ├── config.yaml
//!     ├── roadmap.md           document
//!     ├── trellis.page/        bundle
//!     │   ├── page.md
//!     │   └── diagram.png
//!     └── archive/             sub-garden
//! ```

use std::cmp::Ordering;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDate;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{TrellisError, TrellisResult};
use crate::frontmatter::{self, FrontMatter};
use crate::garden::{self, Garden, GardenConfig};

pub const DOC_EXTENSION: &str = "md";
pub const BUNDLE_SUFFIX: &str = ".page";
pub const BUNDLE_BODY: &str = "page.md";

/// `setup.page` → `setup`; other names pass through.
pub fn strip_bundle_marker(name: &str) -> &str {
    name.strip_suffix(BUNDLE_SUFFIX).unwrap_or(name)
}

/// Derive the URL-safe identity of a path.
///
/// Segments are joined with `/`, the `.md` extension and `.page` marker are
/// dropped, everything is lowercased and spaces become hyphens. Depends on
/// the path string only.
pub fn slugify(path: &str) -> String {
    path.split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|segment| {
            let segment = segment.strip_suffix(".md").unwrap_or(segment);
            strip_bundle_marker(segment).to_lowercase().replace(' ', "-")
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Render a relative path with `/` separators.
pub fn path_to_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_document_file(name: &str) -> bool {
    Path::new(name).extension().and_then(|e| e.to_str()) == Some(DOC_EXTENSION)
}

/// A document discovered by [`DocumentStore::list`].
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    /// Content-root-relative path; the bundle directory for bundles.
    pub path: PathBuf,
    pub front_matter: FrontMatter,
    pub body: String,
    /// Effective "last updated" date, mtime-aware.
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct GardenEntry {
    pub path: PathBuf,
    pub config: GardenConfig,
}

/// One listing entry.
#[derive(Debug, Clone)]
pub enum Entry {
    Document(DocumentEntry),
    Bundle(DocumentEntry),
    SubGarden(GardenEntry),
}

impl Entry {
    pub fn path(&self) -> &Path {
        match self {
            Entry::Document(d) | Entry::Bundle(d) => &d.path,
            Entry::SubGarden(g) => &g.path,
        }
    }

    pub fn document(&self) -> Option<&DocumentEntry> {
        match self {
            Entry::Document(d) | Entry::Bundle(d) => Some(d),
            Entry::SubGarden(_) => None,
        }
    }

    /// Display title: front matter title, else derived from the file name.
    pub fn title(&self) -> String {
        match self {
            Entry::Document(d) | Entry::Bundle(d) => match d.front_matter.title {
                Some(ref t) => t.clone(),
                None => garden::default_title(&file_stem(&d.path)),
            },
            Entry::SubGarden(g) => g.config.title.clone(),
        }
    }

    fn date(&self) -> Option<NaiveDate> {
        match self {
            Entry::Document(d) | Entry::Bundle(d) => Some(d.effective_date),
            Entry::SubGarden(g) => g.config.created_date,
        }
    }

    fn tier(&self) -> u8 {
        match self {
            Entry::SubGarden(_) => 0,
            Entry::Document(_) | Entry::Bundle(_) => 1,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    let name = file_name(path);
    let name = name.strip_suffix(".md").unwrap_or(&name);
    strip_bundle_marker(name).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest effective date first.
    Recent,
    /// Case-insensitive title order.
    Alphabetic,
}

/// Sort a listing: sub-gardens first, then documents and bundles.
pub fn sort_entries(entries: &mut [Entry], order: SortOrder) {
    entries.sort_by(|a, b| {
        a.tier()
            .cmp(&b.tier())
            .then_with(|| match order {
                SortOrder::Recent => b.date().cmp(&a.date()),
                SortOrder::Alphabetic => a.title().to_lowercase().cmp(&b.title().to_lowercase()),
            })
            .then_with(|| a.path().cmp(b.path()))
    });
}

/// One node of a garden's directory tree, from [`DocumentStore::hierarchy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    /// Content-root-relative, `/`-separated.
    pub path: String,
    pub is_bundle: bool,
    /// Empty for documents.
    pub children: Vec<TreeNode>,
}

/// Filesystem-backed store rooted at a content directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    excludes: GlobSet,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excludes: GlobSet::empty(),
        }
    }

    /// Store that also skips entries matching any of `patterns`
    /// (globs relative to the content root).
    pub fn with_excludes(root: impl Into<PathBuf>, patterns: &[String]) -> TrellisResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| TrellisError::InvalidPath(format!("exclude glob '{pattern}': {e}")))?;
            builder.add(glob);
        }
        let excludes = builder
            .build()
            .map_err(|e| TrellisError::InvalidPath(format!("exclude globs: {e}")))?;
        Ok(Self {
            root: root.into(),
            excludes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative path onto the root, rejecting anything that escapes it.
    fn resolve(&self, rel: &Path) -> TrellisResult<PathBuf> {
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(TrellisError::InvalidPath(rel.display().to_string())),
            }
        }
        Ok(self.root.join(rel))
    }

    fn is_excluded(&self, rel: &Path) -> bool {
        !self.excludes.is_empty() && self.excludes.is_match(path_to_string(rel))
    }

    /// Physical file holding a document's text.
    pub fn body_path(&self, rel: impl AsRef<Path>) -> TrellisResult<PathBuf> {
        let rel = rel.as_ref();
        let full = self.resolve(rel)?;
        let path = if full.is_dir() {
            if !is_bundle_path(rel) {
                return Err(TrellisError::NotFound(format!(
                    "{} is a directory, not a document",
                    rel.display()
                )));
            }
            full.join(BUNDLE_BODY)
        } else {
            full
        };
        if !path.is_file() {
            return Err(TrellisError::NotFound(rel.display().to_string()));
        }
        Ok(path)
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.body_path(rel).is_ok()
    }

    pub fn read(&self, rel: impl AsRef<Path>) -> TrellisResult<(FrontMatter, String)> {
        let path = self.body_path(rel)?;
        let raw = std::fs::read_to_string(&path)?;
        frontmatter::parse(&raw)
    }

    /// Atomically write a document. Writing to a bundle path writes its body
    /// file, creating the bundle directory if needed.
    pub fn write(
        &self,
        rel: impl AsRef<Path>,
        front_matter: &FrontMatter,
        body: &str,
    ) -> TrellisResult<PathBuf> {
        let rel = rel.as_ref();
        let full = self.resolve(rel)?;
        let target = if is_bundle_path(rel) {
            full.join(BUNDLE_BODY)
        } else {
            full
        };
        let text = frontmatter::serialize(front_matter, body)?;
        write_atomic(&target, text.as_bytes())?;
        debug!(path = %rel.display(), "wrote document");
        Ok(target)
    }

    /// Remove a document file or a whole bundle directory.
    pub fn delete(&self, rel: impl AsRef<Path>) -> TrellisResult<()> {
        let rel = rel.as_ref();
        let full = self.resolve(rel)?;
        if full.is_dir() {
            if !is_bundle_path(rel) {
                return Err(TrellisError::InvalidPath(format!(
                    "{} is a garden, not a document",
                    rel.display()
                )));
            }
            std::fs::remove_dir_all(&full)?;
        } else if full.is_file() {
            std::fs::remove_file(&full)?;
        } else {
            return Err(TrellisError::NotFound(rel.display().to_string()));
        }
        debug!(path = %rel.display(), "deleted document");
        Ok(())
    }

    /// Modification time of a document's body file.
    pub fn modified(&self, rel: impl AsRef<Path>) -> TrellisResult<SystemTime> {
        let path = self.body_path(rel)?;
        Ok(std::fs::metadata(path)?.modified()?)
    }

    /// List the documents under `dir` (relative to the root; `""` for the root).
    ///
    /// Non-recursive listings return one entry per immediate child, with
    /// bundles and sub-gardens not traversed. Recursive listings return only
    /// documents and bundles from the whole subtree.
    pub fn list(&self, dir: impl AsRef<Path>, recursive: bool) -> TrellisResult<Vec<Entry>> {
        let dir = dir.as_ref();
        let full = self.resolve(dir)?;
        if !full.is_dir() {
            return Err(TrellisError::NotFound(dir.display().to_string()));
        }
        if recursive {
            self.list_recursive(dir, &full)
        } else {
            self.list_children(dir, &full)
        }
    }

    fn list_children(&self, dir: &Path, full: &Path) -> TrellisResult<Vec<Entry>> {
        let mut entries = Vec::new();
        for item in std::fs::read_dir(full)? {
            let item = item?;
            let name = item.file_name().to_string_lossy().to_string();
            let rel = dir.join(&name);
            if is_hidden(&name) || self.is_excluded(&rel) {
                continue;
            }

            let file_type = item.file_type()?;
            if file_type.is_dir() {
                if garden::is_bundle_dir_name(&name) {
                    if let Some(doc) = self.read_entry(&rel) {
                        entries.push(Entry::Bundle(doc));
                    }
                } else {
                    let config = garden::get_or_create_config(&item.path()).unwrap_or_else(|e| {
                        warn!(dir = %rel.display(), error = %e, "cannot persist garden config, using defaults");
                        garden::read_config(&item.path())
                    });
                    entries.push(Entry::SubGarden(GardenEntry { path: rel, config }));
                }
            } else if is_document_file(&name) {
                if let Some(doc) = self.read_entry(&rel) {
                    entries.push(Entry::Document(doc));
                }
            }
        }
        entries.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(entries)
    }

    fn list_recursive(&self, dir: &Path, full: &Path) -> TrellisResult<Vec<Entry>> {
        let mut entries = Vec::new();
        let walker = WalkDir::new(full)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                if is_hidden(&name) {
                    return false;
                }
                let rel = e.path().strip_prefix(&self.root).unwrap_or(e.path());
                !self.is_excluded(rel)
            });

        for item in walker {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let rel = item
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(item.path())
                .to_path_buf();
            let name = item.file_name().to_string_lossy().to_string();

            if item.file_type().is_dir() {
                if garden::is_bundle_dir_name(&name) {
                    if let Some(doc) = self.read_entry(&rel) {
                        entries.push(Entry::Bundle(doc));
                    }
                }
                continue;
            }

            if !is_document_file(&name) {
                continue;
            }
            let inside_bundle = rel.parent().map(is_bundle_path).unwrap_or(false);
            if inside_bundle && name == BUNDLE_BODY {
                continue;
            }
            if let Some(doc) = self.read_entry(&rel) {
                entries.push(Entry::Document(doc));
            }
        }
        Ok(entries)
    }

    /// Read one document for a listing; failures are logged and skipped.
    fn read_entry(&self, rel: &Path) -> Option<DocumentEntry> {
        let result = self
            .read(rel)
            .map(|(fm, body)| (fm, body, self.modified(rel).ok()));
        match result {
            Ok((front_matter, body, modified)) => {
                let effective_date = frontmatter::effective_updated_date(&front_matter, modified);
                Some(DocumentEntry {
                    path: rel.to_path_buf(),
                    front_matter,
                    body,
                    effective_date,
                })
            }
            Err(e) if e.is_not_found() && is_bundle_path(rel) => {
                debug!(path = %rel.display(), "bundle without body, skipping");
                None
            }
            Err(e) => {
                warn!(path = %rel.display(), error = %e, "skipping unreadable document");
                None
            }
        }
    }

    /// Directory tree of a garden: sub-gardens and bundles as nodes with
    /// children, documents as leaves. Directories deeper than `max_depth`
    /// (the garden itself is depth 0) are left out. `None` when the garden
    /// does not exist. Read-only: no garden config is created.
    pub fn hierarchy(&self, garden: &str, max_depth: Option<usize>) -> TrellisResult<Option<TreeNode>> {
        let rel = Path::new(garden);
        let full = self.resolve(rel)?;
        if !full.is_dir() {
            return Ok(None);
        }
        self.tree_node(rel, &full, 0, max_depth)
    }

    fn tree_node(
        &self,
        rel: &Path,
        full: &Path,
        depth: usize,
        max_depth: Option<usize>,
    ) -> TrellisResult<Option<TreeNode>> {
        if max_depth.is_some_and(|max| depth >= max) {
            return Ok(None);
        }

        let mut items: Vec<_> = std::fs::read_dir(full)?.collect::<Result<_, _>>()?;
        items.sort_by_key(|item| item.file_name());

        let mut children = Vec::new();
        for item in items {
            let name = item.file_name().to_string_lossy().to_string();
            let child_rel = rel.join(&name);
            if is_hidden(&name)
                || name == BUNDLE_BODY
                || garden::is_config_file(&name)
                || self.is_excluded(&child_rel)
            {
                continue;
            }
            if item.file_type()?.is_dir() {
                if let Some(node) = self.tree_node(&child_rel, &item.path(), depth + 1, max_depth)? {
                    children.push(node);
                }
            } else if is_document_file(&name) {
                children.push(TreeNode {
                    name,
                    path: path_to_string(&child_rel),
                    is_bundle: false,
                    children: Vec::new(),
                });
            }
        }

        Ok(Some(TreeNode {
            name: file_name(rel),
            path: path_to_string(rel),
            is_bundle: is_bundle_path(rel),
            children,
        }))
    }

    /// Top-level gardens, ordered by configured `order` then title.
    pub fn gardens(&self) -> TrellisResult<Vec<Garden>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut gardens = Vec::new();
        for entry in self.list("", false)? {
            if let Entry::SubGarden(g) = entry {
                gardens.push(Garden {
                    slug: path_to_string(&g.path),
                    config: g.config,
                });
            }
        }
        gardens.sort_by(|a, b| match a.config.order.cmp(&b.config.order) {
            Ordering::Equal => a.config.title.cmp(&b.config.title),
            other => other,
        });
        Ok(gardens)
    }

    /// Documents and bundles directly under the content root.
    pub fn root_documents(&self) -> TrellisResult<Vec<DocumentEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        Ok(self
            .list("", false)?
            .into_iter()
            .filter_map(|e| match e {
                Entry::Document(d) | Entry::Bundle(d) => Some(d),
                Entry::SubGarden(_) => None,
            })
            .collect())
    }
}

fn is_bundle_path(rel: &Path) -> bool {
    rel.file_name()
        .map(|n| garden::is_bundle_dir_name(&n.to_string_lossy()))
        .unwrap_or(false)
}

fn write_atomic(target: &Path, bytes: &[u8]) -> TrellisResult<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| TrellisError::Io(e.error))?;
    Ok(())
}
