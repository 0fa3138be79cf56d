//! Garden configuration.
//!
//! Every directory that is not a bundle is a garden (top-level) or a nested
//! sub-garden. Its display metadata lives in `config.yaml` inside the
//! directory; when the file is missing a default is synthesised from the
//! directory name.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TrellisResult;
use crate::store::{slugify, strip_bundle_marker, BUNDLE_SUFFIX};

pub const CONFIG_FILE: &str = "config.yaml";
pub const CONFIG_FILE_ALT: &str = "config.yml";
pub const DEFAULT_ORDER: i64 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GardenConfig {
    pub title: String,
    pub description: String,
    pub created_date: Option<NaiveDate>,
    pub order: i64,
}

/// On-disk shape; every field optional so partial files still load.
#[derive(Debug, Default, Deserialize)]
struct RawGardenConfig {
    title: Option<String>,
    description: Option<String>,
    created_date: Option<NaiveDate>,
    order: Option<i64>,
}

impl GardenConfig {
    pub fn default_for(dir_name: &str) -> Self {
        Self {
            title: default_title(dir_name),
            description: String::new(),
            created_date: None,
            order: DEFAULT_ORDER,
        }
    }

    fn from_raw(raw: RawGardenConfig, dir_name: &str) -> Self {
        Self {
            title: raw.title.unwrap_or_else(|| default_title(dir_name)),
            description: raw.description.unwrap_or_default(),
            created_date: raw.created_date,
            order: raw.order.unwrap_or(DEFAULT_ORDER),
        }
    }
}

/// `my-project_notes` → `My Project Notes`.
pub fn default_title(dir_name: &str) -> String {
    strip_bundle_marker(dir_name)
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn load(dir: &Path) -> TrellisResult<Option<GardenConfig>> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let raw: Option<RawGardenConfig> = serde_yaml::from_str(&content)?;
    Ok(Some(GardenConfig::from_raw(raw.unwrap_or_default(), &dir_name(dir))))
}

/// Read a directory's configuration without touching the filesystem.
///
/// Missing or unreadable files yield the synthesised default.
pub fn read_config(dir: &Path) -> GardenConfig {
    match load(dir) {
        Ok(Some(config)) => config,
        Ok(None) => GardenConfig::default_for(&dir_name(dir)),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "unreadable garden config, using defaults");
            GardenConfig::default_for(&dir_name(dir))
        }
    }
}

/// Read a directory's configuration, persisting the default if none exists.
///
/// An existing but unparsable file is left alone.
pub fn get_or_create_config(dir: &Path) -> TrellisResult<GardenConfig> {
    match load(dir) {
        Ok(Some(config)) => Ok(config),
        Ok(None) => {
            let config = GardenConfig::default_for(&dir_name(dir));
            write_config(dir, &config)?;
            debug!(dir = %dir.display(), "created default garden config");
            Ok(config)
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "unreadable garden config, using defaults");
            Ok(GardenConfig::default_for(&dir_name(dir)))
        }
    }
}

pub fn write_config(dir: &Path, config: &GardenConfig) -> TrellisResult<()> {
    std::fs::create_dir_all(dir)?;
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(dir.join(CONFIG_FILE), yaml)?;
    Ok(())
}

/// A top-level collection.
#[derive(Debug, Clone)]
pub struct Garden {
    /// Directory name under the content root.
    pub slug: String,
    pub config: GardenConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub label: String,
    /// `None` for the current page.
    pub url: Option<String>,
}

/// Navigation trail for a garden-relative article path.
pub fn breadcrumbs(garden: &Garden, article_path: &str) -> Vec<Breadcrumb> {
    let mut crumbs = vec![
        Breadcrumb {
            label: "Home".to_string(),
            url: Some("/".to_string()),
        },
        Breadcrumb {
            label: garden.config.title.clone(),
            url: Some(format!("/garden/{}", slugify(&garden.slug))),
        },
    ];

    let parts: Vec<&str> = article_path.split('/').filter(|p| !p.is_empty()).collect();
    let Some((last, parents)) = parts.split_last() else {
        return crumbs;
    };

    let mut accumulated = String::new();
    for part in parents {
        if !accumulated.is_empty() {
            accumulated.push('/');
        }
        accumulated.push_str(part);
        crumbs.push(Breadcrumb {
            label: default_title(part),
            url: Some(format!("/garden/{}/{}", slugify(&garden.slug), slugify(&accumulated))),
        });
    }
    crumbs.push(Breadcrumb {
        label: default_title(last.trim_end_matches(".md")),
        url: None,
    });
    crumbs
}

pub fn is_config_file(name: &str) -> bool {
    name == CONFIG_FILE || name == CONFIG_FILE_ALT
}

pub fn is_bundle_dir_name(name: &str) -> bool {
    name.ends_with(BUNDLE_SUFFIX)
}
