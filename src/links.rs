//! Link Resolver: `[[target]]` cross-references and `{{include: file}}`
//! inclusion.
//!
//! Resolution is a pure transform over the body text given a lookup
//! function; [`resolve_with_index`] supplies one backed by a
//! [`ContentIndex`]. Unresolved targets are an expected outcome and are
//! collected in [`Resolution::unresolved`], never raised.

use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::content_index::ContentIndex;
use crate::error::TrellisResult;
use crate::store::slugify;

/// Where a resolved link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub url: String,
    pub title: Option<String>,
}

/// Rewritten text plus the targets that could not be resolved, in first
/// occurrence order without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    pub unresolved: Vec<String>,
}

fn link_pattern() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| {
        Regex::new(r"\[\[([^\[\]|]+?)(?:\|([^\[\]]+?))?\]\]").expect("link pattern is valid")
    })
}

fn include_pattern() -> &'static Regex {
    static INCLUDE: OnceLock<Regex> = OnceLock::new();
    INCLUDE.get_or_init(|| {
        Regex::new(r"\{\{include:\s*([^\}]+)\}\}").expect("include pattern is valid")
    })
}

/// A parsed `[[target|display]]` marker.
struct Marker<'a> {
    target: &'a str,
    display: Option<&'a str>,
}

fn marker<'a>(caps: &Captures<'a>) -> Marker<'a> {
    Marker {
        target: caps.get(1).map(|m| m.as_str().trim()).unwrap_or(""),
        display: caps
            .get(2)
            .map(|m| m.as_str().trim())
            .filter(|d| !d.is_empty()),
    }
}

/// Every distinct link target in `body`, in order of first appearance.
pub fn link_targets(body: &str) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for caps in link_pattern().captures_iter(body) {
        let target = marker(&caps).target.to_string();
        if !target.is_empty() && !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

/// Rewrite every link marker using `lookup`.
///
/// A hit becomes `[text](url)` where text is the marker's display text, else
/// the resolved title, else the raw target. A miss keeps the marker wrapped
/// in `<span class="broken-link">` and records the target. A marker with a
/// blank target is left as written.
pub fn resolve_links<F>(body: &str, mut lookup: F) -> Resolution
where
    F: FnMut(&str) -> Option<LinkTarget>,
{
    let mut unresolved: Vec<String> = Vec::new();
    let text = link_pattern().replace_all(body, |caps: &Captures| {
        let m = marker(caps);
        if m.target.is_empty() {
            return caps[0].to_string();
        }
        match lookup(m.target) {
            Some(found) => {
                let label = m
                    .display
                    .or(found.title.as_deref())
                    .unwrap_or(m.target);
                format!("[{}]({})", label, found.url)
            }
            None => {
                if !unresolved.iter().any(|t| t == m.target) {
                    unresolved.push(m.target.to_string());
                }
                format!("<span class=\"broken-link\">{}</span>", &caps[0])
            }
        }
    });
    Resolution {
        text: text.into_owned(),
        unresolved,
    }
}

/// Replace link markers with their display text, for search bodies.
pub fn strip_link_markers(body: &str) -> String {
    link_pattern()
        .replace_all(body, |caps: &Captures| {
            let m = marker(caps);
            m.display.unwrap_or(m.target).to_string()
        })
        .into_owned()
}

/// Look a target up: exact title, then slug/path, then fuzzy title.
pub async fn lookup_target(
    index: &dyn ContentIndex,
    target: &str,
) -> TrellisResult<Option<LinkTarget>> {
    let row = match index.find_page_by_title(target).await? {
        Some(row) => Some(row),
        None => match index.find_page_by_slug(&slugify(target)).await? {
            Some(row) => Some(row),
            None => index
                .find_pages_by_title_fuzzy(target, 1)
                .await?
                .into_iter()
                .next(),
        },
    };
    Ok(row.map(|r| LinkTarget {
        url: r.url,
        title: r.title,
    }))
}

/// Resolve every link in `body` against a content index.
pub async fn resolve_with_index(
    body: &str,
    index: &dyn ContentIndex,
) -> TrellisResult<Resolution> {
    let mut found: HashMap<String, Option<LinkTarget>> = HashMap::new();
    for target in link_targets(body) {
        let hit = lookup_target(index, &target).await?;
        found.insert(target, hit);
    }
    let resolution = resolve_links(body, |target| found.get(target).cloned().flatten());
    if !resolution.unresolved.is_empty() {
        debug!(unresolved = ?resolution.unresolved, "unresolved links");
    }
    Ok(resolution)
}

/// Inline `{{include: name}}` markers from files next to the document.
///
/// `base_dir` is the directory containing the document's body file. Missing
/// or unreadable files become an HTML comment; paths leaving `base_dir` are
/// refused the same way.
pub fn expand_includes(body: &str, base_dir: &Path) -> String {
    include_pattern()
        .replace_all(body, |caps: &Captures| {
            let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            let rel = Path::new(name);
            let escapes = rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if name.is_empty() || escapes {
                return format!("<!-- Error including {name}: path outside document directory -->");
            }
            match std::fs::read_to_string(base_dir.join(rel)) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    format!("<!-- Include not found: {name} -->")
                }
                Err(e) => format!("<!-- Error including {name}: {e} -->"),
            }
        })
        .into_owned()
}
