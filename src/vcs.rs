//! Version control hook run after a successful save or delete.
//!
//! Failures are reported to the caller, which logs them; they never undo or
//! fail the write that triggered the commit.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::config::Config;
use crate::error::{TrellisError, TrellisResult};

pub trait VersionControl: Send + Sync {
    /// Stage `path` (additions, edits or removal) and commit it.
    fn commit(&self, path: &Path, message: &str) -> TrellisResult<()>;
}

/// The hook selected by `[vcs]`: git in the configured repository (the
/// content directory by default) when enabled, otherwise [`NoopHook`].
pub fn from_config(config: &Config) -> Box<dyn VersionControl> {
    if config.vcs.enabled {
        debug!(repo = %config.vcs_repo().display(), "git commits enabled");
        Box::new(GitHook::new(config.vcs_repo()))
    } else {
        Box::new(NoopHook)
    }
}

/// Does nothing. Used when version control is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl VersionControl for NoopHook {
    fn commit(&self, _path: &Path, _message: &str) -> TrellisResult<()> {
        Ok(())
    }
}

/// Commits through the `git` command line in an existing repository.
#[derive(Debug, Clone)]
pub struct GitHook {
    repo: PathBuf,
}

impl GitHook {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn git(&self, args: &[&str]) -> TrellisResult<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .map_err(|e| TrellisError::Vcs(format!("failed to execute 'git {}': {e}", args[0])))
    }
}

impl VersionControl for GitHook {
    fn commit(&self, path: &Path, message: &str) -> TrellisResult<()> {
        let path_arg = path.to_string_lossy();

        let output = self.git(&["add", "-A", "--", &path_arg])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrellisError::Vcs(format!("git add failed: {}", stderr.trim())));
        }

        let output = self.git(&["commit", "-m", message, "--", &path_arg])?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            // Saving unchanged content is not an error.
            if stdout.contains("nothing to commit") || stdout.contains("no changes added") {
                return Ok(());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrellisError::Vcs(format!("git commit failed: {}", stderr.trim())));
        }

        Ok(())
    }
}
