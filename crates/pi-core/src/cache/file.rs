//! Directory-backed cache.
//!
//! # Layout
//!
//! ```text
//! ~/.cache/pi/registry/
//!   {sha256(key)}.json   # {"key": ..., "stored_at": ..., "value": ...}
//! ```

use super::key::entry_file_name;
use super::CacheBackend;
use crate::error::{DataError, DataResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    stored_at: DateTime<Utc>,
    value: Value,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    /// Cache under the user cache directory.
    ///
    /// Default: `~/.cache/pi/registry`
    pub fn new() -> DataResult<Self> {
        Ok(Self {
            cache_dir: default_cache_dir()?,
        })
    }

    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(entry_file_name(key))
    }

    fn read_entry(path: &Path) -> DataResult<Option<StoredEntry>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DataError::cache(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

pub(crate) fn default_cache_dir() -> DataResult<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| DataError::cache("could not determine cache directory"))?;
    Ok(base.join("pi").join("registry"))
}

fn write_atomic(path: &Path, content: &str) -> DataResult<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)
        .map_err(|e| DataError::cache(format!("failed to write temp file: {}", e)))?;
    fs::rename(&temp_path, path)
        .map_err(|e| DataError::cache(format!("failed to rename temp file: {}", e)))?;
    Ok(())
}

impl CacheBackend for FileCache {
    fn get(&self, key: &str) -> DataResult<Option<Value>> {
        Ok(Self::read_entry(&self.entry_path(key))?
            .filter(|entry| entry.key == key)
            .map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: &Value) -> DataResult<()> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::cache(format!("failed to create cache directory: {}", e)))?;
        let entry = StoredEntry {
            key: key.to_string(),
            stored_at: Utc::now(),
            value: value.clone(),
        };
        write_atomic(&self.entry_path(key), &serde_json::to_string(&entry)?)?;
        debug!(key, "cached entry");
        Ok(())
    }

    fn remove(&self, key: &str) -> DataResult<bool> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DataError::cache(format!("failed to evict {}: {}", key, e))),
        }
    }

    fn clear_prefix(&self, prefix: &str) -> DataResult<usize> {
        let dir = match fs::read_dir(&self.cache_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for item in dir {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let entry = match Self::read_entry(&path) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            if entry.key.starts_with(prefix) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        debug!(prefix, removed, "cleared cache prefix");
        Ok(removed)
    }
}
