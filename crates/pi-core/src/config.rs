//! Data layer configuration.
//!
//! Loaded from YAML; every field has a default so an empty file is valid.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PI_DB_PATH` | SQLite database file (default: `pi.db`) |
//! | `PI_TABLE_PREFIX` | Prefix for every table name (default: empty) |
//! | `PI_CACHE_DIR` | Directory of the file cache; selects the `file` backend |

use crate::module::DEFAULT_MODULE;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PiConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub module: ModuleConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub table_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pi.db"),
            table_prefix: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheKind,
    /// File cache directory; the user cache directory when unset.
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    #[default]
    Memory,
    File,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ModuleConfig {
    /// Module used when callers do not name one.
    pub default: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_MODULE.to_string(),
        }
    }
}

impl PiConfig {
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("parse pi config")
    }

    /// Apply `PI_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("PI_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(prefix) = std::env::var("PI_TABLE_PREFIX") {
            self.database.table_prefix = prefix;
        }
        if let Ok(dir) = std::env::var("PI_CACHE_DIR") {
            self.cache.backend = CacheKind::File;
            self.cache.dir = Some(PathBuf::from(dir));
        }
        self
    }
}

/// Read the config file at `path` (defaults when no path is given), then
/// apply environment overrides. A named file that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PiConfig> {
    let config = match path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            PiConfig::from_yaml(&content)
                .with_context(|| format!("load config {}", path.display()))?
        }
        Some(path) => anyhow::bail!("config file not found: {}", path.display()),
        None => PiConfig::default(),
    };
    Ok(config.with_env_overrides())
}
