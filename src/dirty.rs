//! Persisted "indexes are stale" marker.
//!
//! Presence of the marker file means dirty; absence means clean. The file
//! holds the RFC 3339 time it was last set, for display only.
//!
//! A rebuild [`claim`](DirtyFlag::claim)s the marker by renaming it aside
//! before walking the tree, and [`release`](DirtyFlag::release)s only that
//! claim when it finishes. A save that raises the flag mid-rebuild writes a
//! fresh marker, which survives the release.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::content_index::now_timestamp;
use crate::error::TrellisResult;

const CLAIM_SUFFIX: &str = ".rebuilding";

#[derive(Debug, Clone)]
pub struct DirtyFlag {
    path: PathBuf,
}

impl DirtyFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn claim_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(CLAIM_SUFFIX);
        PathBuf::from(name)
    }

    /// Set, or claimed by a rebuild that has not finished.
    pub fn is_set(&self) -> bool {
        self.path.exists() || self.claim_path().exists()
    }

    pub fn set(&self) -> TrellisResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, now_timestamp())?;
        Ok(())
    }

    /// Remove the marker and any outstanding claim. Idempotent.
    pub fn clear(&self) -> TrellisResult<()> {
        remove_if_present(&self.path)?;
        remove_if_present(&self.claim_path())
    }

    /// Move the current marker aside for a rebuild. Returns whether there was
    /// one to claim.
    pub fn claim(&self) -> TrellisResult<bool> {
        match std::fs::rename(&self.path, self.claim_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The rebuild succeeded: drop the claim. A marker set since the claim
    /// stays in place.
    pub fn release(&self) -> TrellisResult<()> {
        remove_if_present(&self.claim_path())
    }

    /// The rebuild failed: the indexes may be half-replaced, so raise the
    /// marker again and drop the claim.
    pub fn restore(&self) -> TrellisResult<()> {
        self.set()?;
        remove_if_present(&self.claim_path())
    }

    /// When the flag was set, if it is.
    pub fn set_at(&self) -> Option<String> {
        std::fs::read_to_string(&self.path)
            .or_else(|_| std::fs::read_to_string(self.claim_path()))
            .ok()
            .map(|s| s.trim().to_string())
    }
}

fn remove_if_present(path: &Path) -> TrellisResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_and_clear() {
        let tmp = TempDir::new().unwrap();
        let flag = DirtyFlag::new(tmp.path().join("data/.index_dirty"));
        assert!(!flag.is_set());
        assert_eq!(flag.set_at(), None);

        flag.set().unwrap();
        assert!(flag.is_set());
        assert!(flag.set_at().unwrap().ends_with('Z'));

        flag.clear().unwrap();
        assert!(!flag.is_set());
        flag.clear().unwrap();
    }

    #[test]
    fn test_claim_and_release() {
        let tmp = TempDir::new().unwrap();
        let flag = DirtyFlag::new(tmp.path().join(".index_dirty"));
        assert!(!flag.claim().unwrap());

        flag.set().unwrap();
        assert!(flag.claim().unwrap());
        assert!(!flag.path().exists());
        // Still stale while the rebuild runs.
        assert!(flag.is_set());
        assert!(flag.set_at().is_some());

        flag.release().unwrap();
        assert!(!flag.is_set());
    }

    #[test]
    fn test_set_during_claim_survives_release() {
        let tmp = TempDir::new().unwrap();
        let flag = DirtyFlag::new(tmp.path().join(".index_dirty"));
        flag.set().unwrap();
        flag.claim().unwrap();

        flag.set().unwrap();
        flag.release().unwrap();
        assert!(flag.is_set());
        assert!(flag.path().exists());
    }

    #[test]
    fn test_restore_after_failed_rebuild() {
        let tmp = TempDir::new().unwrap();
        let flag = DirtyFlag::new(tmp.path().join(".index_dirty"));
        flag.claim().unwrap();

        flag.restore().unwrap();
        assert!(flag.path().exists());

        flag.claim().unwrap();
        flag.release().unwrap();
        assert!(!flag.is_set());
    }
}
