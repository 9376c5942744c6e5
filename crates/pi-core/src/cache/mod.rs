//! Key-value cache backends used by registries.
//!
//! Keys are plain strings; registries namespace them as
//! `registry.<type>.<namespace>`. Values are JSON documents. Backends do no
//! TTL management: entries live until removed.

mod file;
mod key;
mod memory;

pub use file::FileCache;
pub use key::entry_file_name;
pub use memory::MemoryCache;

use crate::config::{CacheConfig, CacheKind};
use crate::error::DataResult;
use serde_json::Value;
use std::sync::Arc;

pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> DataResult<Option<Value>>;

    fn set(&self, key: &str, value: &Value) -> DataResult<()>;

    /// Remove one key; `true` when it existed.
    fn remove(&self, key: &str) -> DataResult<bool>;

    /// Remove every key starting with `prefix`; returns how many were removed.
    fn clear_prefix(&self, prefix: &str) -> DataResult<usize>;
}

/// Build the backend selected by configuration.
pub fn from_config(config: &CacheConfig) -> DataResult<Arc<dyn CacheBackend>> {
    Ok(match config.backend {
        CacheKind::Memory => Arc::new(MemoryCache::new()),
        CacheKind::File => {
            let cache = match &config.dir {
                Some(dir) => FileCache::with_dir(dir),
                None => FileCache::new()?,
            };
            Arc::new(cache)
        }
    })
}
