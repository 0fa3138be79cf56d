//! Error taxonomy for the indexing subsystem.
//!
//! Library code returns [`TrellisResult`]; the CLI layer wraps these in
//! `anyhow` with context. Link-resolution misses are deliberately absent:
//! an unresolved `[[target]]` is an expected outcome, recorded in
//! [`Resolution::unresolved`](crate::links::Resolution), not an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    /// The requested document, bundle body or garden does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied path escapes the content root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Underlying index storage failure (disk, corruption, locking).
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Malformed full-text query syntax.
    #[error("invalid search query: {0}")]
    Query(String),

    #[error("front matter error: {0}")]
    FrontMatter(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("version control error: {0}")]
    Vcs(String),
}

impl TrellisError {
    pub fn is_not_found(&self) -> bool {
        match self {
            TrellisError::NotFound(_) => true,
            TrellisError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type TrellisResult<T> = Result<T, TrellisError>;
