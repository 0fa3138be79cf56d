//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment variables, then
//! command-line flags, each layer overriding the previous one:
//!
//! ```toml
//! [paths]
//! data_dir = "./data"
//! content_dir = "./data/content"   # defaults to <data_dir>/content
//! exclude_globs = ["**/drafts/**"]
//!
//! [index]
//! deferred = false
//! recent_limit = 10
//!
//! [search]
//! default_limit = 20
//!
//! [vcs]
//! enabled = true
//! repo = "./data/content"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "TRELLIS_DATA_DIR";
pub const ENV_CONTENT_DIR: &str = "TRELLIS_CONTENT_DIR";
pub const ENV_DEFERRED: &str = "TRELLIS_DEFERRED_INDEXING";
/// Unprefixed names read after the `TRELLIS_*` ones.
pub const ENV_DATA_DIR_FALLBACK: &str = "DATA_DIR";
pub const ENV_CONTENT_DIR_FALLBACK: &str = "CONTENT_DIR";

pub const CONTENT_DB_FILE: &str = "trellis_content.db";
pub const SEARCH_DB_FILE: &str = "search_index.db";
pub const DIRTY_FLAG_FILE: &str = ".index_dirty";

/// On-disk file shape.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub vcs: VcsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PathsConfig {
    pub data_dir: Option<PathBuf>,
    pub content_dir: Option<PathBuf>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Mark indexes dirty on save instead of updating them.
    #[serde(default)]
    pub deferred: bool,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: i64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            deferred: false,
            recent_limit: default_recent_limit(),
        }
    }
}

fn default_recent_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VcsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Repository root; defaults to the content directory.
    pub repo: Option<PathBuf>,
}

/// Command-line overrides (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub content_dir: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub content_dir: PathBuf,
    pub exclude_globs: Vec<String>,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub vcs: VcsConfig,
}

impl Config {
    /// Settings for a data directory with everything else defaulted.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            content_dir: data_dir.join("content"),
            data_dir,
            exclude_globs: Vec::new(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            vcs: VcsConfig::default(),
        }
    }

    pub fn content_index_path(&self) -> PathBuf {
        self.data_dir.join(CONTENT_DB_FILE)
    }

    pub fn search_index_path(&self) -> PathBuf {
        self.data_dir.join(SEARCH_DB_FILE)
    }

    pub fn dirty_flag_path(&self) -> PathBuf {
        self.data_dir.join(DIRTY_FLAG_FILE)
    }

    pub fn vcs_repo(&self) -> &Path {
        self.vcs.repo.as_deref().unwrap_or(&self.content_dir)
    }
}

/// Load settings from `path` (if it exists), the process environment and
/// `overrides`.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<Config> {
    let file = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        ConfigFile::default()
    };

    resolve(file, |key| std::env::var(key).ok(), overrides)
}

/// Layer environment and overrides onto a parsed file and validate.
pub fn resolve<F>(file: ConfigFile, env: F, overrides: &Overrides) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let env_path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

    let data_dir = overrides
        .data_dir
        .clone()
        .or_else(|| env_path(ENV_DATA_DIR))
        .or_else(|| env_path(ENV_DATA_DIR_FALLBACK))
        .or(file.paths.data_dir)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Data directory not configured. Set paths.data_dir, {} or --data-dir.",
                ENV_DATA_DIR
            )
        })?;

    let content_dir = overrides
        .content_dir
        .clone()
        .or_else(|| env_path(ENV_CONTENT_DIR))
        .or_else(|| env_path(ENV_CONTENT_DIR_FALLBACK))
        .or(file.paths.content_dir)
        .unwrap_or_else(|| data_dir.join("content"));

    let mut index = file.index;
    if let Some(value) = env(ENV_DEFERRED) {
        index.deferred = parse_flag(&value);
    }

    // Validate limits
    if index.recent_limit < 1 {
        anyhow::bail!("index.recent_limit must be >= 1");
    }
    if file.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    Ok(Config {
        data_dir,
        content_dir,
        exclude_globs: file.paths.exclude_globs,
        index,
        search: file.search,
        vcs: file.vcs,
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
