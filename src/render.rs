//! Body rendering.
//!
//! Markdown-to-HTML conversion is a swappable collaborator behind
//! [`Renderer`]. The crate ships [`ParagraphRenderer`], which only splits
//! blank-line separated blocks into paragraphs; real deployments plug in a
//! full markdown renderer.

use std::path::Path;

use crate::content_index::ContentIndex;
use crate::error::TrellisResult;
use crate::frontmatter::FrontMatter;
use crate::links;
use crate::store::DocumentStore;

pub trait Renderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphRenderer;

impl Renderer for ParagraphRenderer {
    fn render(&self, text: &str) -> String {
        let mut html = String::new();
        let mut block: Vec<&str> = Vec::new();
        for line in text.lines().chain(std::iter::once("")) {
            if line.trim().is_empty() {
                if !block.is_empty() {
                    html.push_str("<p>");
                    html.push_str(&block.join("\n"));
                    html.push_str("</p>\n");
                    block.clear();
                }
            } else {
                block.push(line.trim_end());
            }
        }
        html
    }
}

/// A page rendered for display.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub front_matter: FrontMatter,
    pub html: String,
    /// Link targets that matched nothing in the content index.
    pub unresolved: Vec<String>,
}

/// Read, expand includes, resolve links against the content index and render.
pub async fn render_page(
    store: &DocumentStore,
    index: &dyn ContentIndex,
    renderer: &dyn Renderer,
    path: impl AsRef<Path>,
) -> TrellisResult<RenderedPage> {
    let path = path.as_ref();
    let (front_matter, body) = store.read(path)?;
    let base_dir = body_dir(store, path)?;
    let expanded = links::expand_includes(&body, &base_dir);
    let resolution = links::resolve_with_index(&expanded, index).await?;
    Ok(RenderedPage {
        front_matter,
        html: renderer.render(&resolution.text),
        unresolved: resolution.unresolved,
    })
}

/// Render a body for the search index: includes expanded, link markers
/// reduced to their text, no content index lookups.
pub fn render_for_index(body: &str, base_dir: &Path, renderer: &dyn Renderer) -> String {
    let expanded = links::expand_includes(body, base_dir);
    renderer.render(&links::strip_link_markers(&expanded))
}

/// Directory holding a document's body file; includes resolve against it.
pub fn body_dir(store: &DocumentStore, path: &Path) -> TrellisResult<std::path::PathBuf> {
    let body = store.body_path(path)?;
    Ok(body
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| store.root().to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_renderer() {
        let html = ParagraphRenderer.render("First line\nsecond line\n\n\nNext block\n");
        assert_eq!(html, "<p>First line\nsecond line</p>\n<p>Next block</p>\n");
        assert_eq!(ParagraphRenderer.render(""), "");
    }
}
