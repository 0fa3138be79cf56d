//! Save and delete workflows.
//!
//! The document store write is the only step that can fail a save. The
//! version control commit and the index update run afterwards and their
//! failures are logged, never returned.

use std::path::PathBuf;

use chrono::Local;
use tracing::warn;

use crate::corpus::{page_url, source_file};
use crate::error::TrellisResult;
use crate::frontmatter::FrontMatter;
use crate::index_manager::{IndexManager, IndexUpdate};
use crate::vcs::VersionControl;

#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// Path relative to the garden, or to the content root.
    pub path: String,
    pub garden: Option<String>,
    pub front_matter: FrontMatter,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// File actually written (`page.md` for bundles).
    pub written: PathBuf,
    pub url: String,
    pub index: IndexUpdate,
}

/// Stamp, write, commit, index.
pub async fn save_document(
    manager: &IndexManager,
    vcs: &dyn VersionControl,
    request: SaveRequest,
) -> TrellisResult<SaveOutcome> {
    let garden = request.garden.as_deref();
    let source = source_file(garden, &request.path);

    let mut front_matter = request.front_matter;
    front_matter.updated_date = Some(Local::now().date_naive());

    let written = manager.store().write(&source, &front_matter, &request.body)?;

    let label = front_matter.title.as_deref().unwrap_or(&source);
    if let Err(e) = vcs.commit(&written, &format!("Update: {label}")) {
        warn!(path = %source, error = %e, "version control commit failed");
    }

    let index = manager.update_file(&request.path, garden).await;
    Ok(SaveOutcome {
        written,
        url: page_url(garden, &request.path),
        index,
    })
}

/// Delete, commit, drop from the indexes.
pub async fn delete_document(
    manager: &IndexManager,
    vcs: &dyn VersionControl,
    path: &str,
    garden: Option<&str>,
) -> TrellisResult<IndexUpdate> {
    let source = source_file(garden, path);
    manager.store().delete(&source)?;

    let full = manager.store().root().join(&source);
    if let Err(e) = vcs.commit(&full, &format!("Delete: {source}")) {
        warn!(path = %source, error = %e, "version control commit failed");
    }

    Ok(manager.remove_file(path, garden).await)
}
