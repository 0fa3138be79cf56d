//! Corpus walk: every indexable page in the content tree.
//!
//! URLs are derived from paths alone so that the content index, the search
//! index and the link resolver agree on identity:
//!
//! | Location | URL | `source_file` |
//! |----------|-----|---------------|
//! | garden `g`, path `p` | `/garden/<slug(g)>/<slug(p)>` | `g/p` |
//! | content root, path `p` | `/page/<slug(p)>` | `p` |

use std::path::{Component, Path};

use tracing::{debug, warn};

use crate::error::TrellisResult;
use crate::models::IndexedPage;
use crate::render::{self, Renderer};
use crate::store::{path_to_string, slugify, DocumentEntry, DocumentStore};

pub fn page_url(garden: Option<&str>, path: &str) -> String {
    match garden {
        Some(g) => format!("/garden/{}/{}", slugify(g), slugify(path)),
        None => format!("/page/{}", slugify(path)),
    }
}

pub fn source_file(garden: Option<&str>, path: &str) -> String {
    let path = path.trim_matches('/');
    match garden {
        Some(g) => format!("{}/{}", g.trim_matches('/'), path),
        None => path.to_string(),
    }
}

/// Split a content-root-relative path into its garden and the path inside
/// it. Single-segment paths are root-level documents.
pub fn locate(path: &Path) -> (Option<String>, String) {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    match parts.split_first() {
        Some((garden, rest)) if !rest.is_empty() => (Some(garden.clone()), rest.join("/")),
        _ => (None, parts.join("/")),
    }
}

/// Render one listed document into an indexable page.
pub fn index_entry(
    store: &DocumentStore,
    renderer: &dyn Renderer,
    entry: &DocumentEntry,
) -> TrellisResult<IndexedPage> {
    let (garden, rel) = locate(&entry.path);
    let base_dir = render::body_dir(store, &entry.path)?;
    let html = render::render_for_index(&entry.body, &base_dir, renderer);
    Ok(IndexedPage {
        url: page_url(garden.as_deref(), &rel),
        source_file: path_to_string(&entry.path),
        garden,
        front_matter: entry.front_matter.clone(),
        html,
    })
}

/// Walk every root-level document and every garden recursively.
pub fn collect_pages(store: &DocumentStore, renderer: &dyn Renderer) -> TrellisResult<Vec<IndexedPage>> {
    let mut pages = Vec::new();

    for entry in store.root_documents()? {
        push_page(store, renderer, &entry, &mut pages);
    }

    for garden in store.gardens()? {
        let entries = store.list(&garden.slug, true)?;
        debug!(garden = %garden.slug, count = entries.len(), "walked garden");
        for entry in entries.iter().filter_map(|e| e.document()) {
            push_page(store, renderer, entry, &mut pages);
        }
    }

    Ok(pages)
}

fn push_page(
    store: &DocumentStore,
    renderer: &dyn Renderer,
    entry: &DocumentEntry,
    pages: &mut Vec<IndexedPage>,
) {
    match index_entry(store, renderer, entry) {
        Ok(page) => pages.push(page),
        Err(e) => warn!(path = %entry.path.display(), error = %e, "skipping page"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ParagraphRenderer;
    use tempfile::TempDir;

    #[test]
    fn test_page_url() {
        assert_eq!(page_url(Some("docs"), "Getting Started.md"), "/garden/docs/getting-started");
        assert_eq!(page_url(Some("Tech Notes"), "rust/intro.page"), "/garden/tech-notes/rust/intro");
        assert_eq!(page_url(None, "about.md"), "/page/about");
        assert_eq!(source_file(Some("docs"), "a/b.md"), "docs/a/b.md");
        assert_eq!(source_file(None, "about.md"), "about.md");
    }

    #[test]
    fn test_locate() {
        assert_eq!(locate(Path::new("about.md")), (None, "about.md".to_string()));
        assert_eq!(
            locate(Path::new("docs/rust/intro.page")),
            (Some("docs".to_string()), "rust/intro.page".to_string())
        );
    }

    #[test]
    fn test_collect_pages() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("docs/guide.page")).unwrap();
        std::fs::write(root.join("about.md"), "---\ntitle: About\n---\nSee [[Guide|the guide]]").unwrap();
        std::fs::write(root.join("docs/guide.page/page.md"), "---\ntitle: Guide\n---\n{{include: part.txt}}").unwrap();
        std::fs::write(root.join("docs/guide.page/part.txt"), "included body").unwrap();

        let store = DocumentStore::new(root);
        let mut pages = collect_pages(&store, &ParagraphRenderer).unwrap();
        pages.sort_by(|a, b| a.url.cmp(&b.url));

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].url, "/garden/docs/guide");
        assert_eq!(pages[0].source_file, "docs/guide.page");
        assert_eq!(pages[0].garden.as_deref(), Some("docs"));
        assert_eq!(pages[0].html, "<p>included body</p>\n");
        assert_eq!(pages[1].url, "/page/about");
        assert_eq!(pages[1].html, "<p>See the guide</p>\n");
    }
}
