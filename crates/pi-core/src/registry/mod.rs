//! Read-through registries over a cache backend.
//!
//! A registry caches whatever its [`RegistryLoader`] produces under
//! `registry.<type>.<namespace>`. Nothing watches the underlying tables:
//! after writing, callers must `clear`, `create` or `flush` explicitly.

mod role;
mod route;

pub use role::{RoleEntry, RoleLoader, RoleRegistry, Roles};
pub use route::{RouteLoader, RouteRegistry, RouteSelector, Routes};

use crate::cache::CacheBackend;
use crate::error::DataResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces registry data from the authoritative source.
pub trait RegistryLoader: Send + Sync {
    type Selector;
    type Data: Serialize + DeserializeOwned;

    /// Registry type, the first component of every cache key.
    fn name(&self) -> &'static str;

    fn namespace(&self, selector: &Self::Selector) -> String;

    fn load(&self, selector: &Self::Selector) -> DataResult<Self::Data>;

    /// Whether clearing one namespace must drop every namespace of the type.
    fn clear_whole_family(&self) -> bool {
        false
    }
}

pub struct Registry<L> {
    loader: L,
    cache: Arc<dyn CacheBackend>,
}

impl<L: RegistryLoader> Registry<L> {
    pub fn new(loader: L, cache: Arc<dyn CacheBackend>) -> Self {
        Self { loader, cache }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn prefix(&self) -> String {
        format!("registry.{}.", self.loader.name())
    }

    pub fn namespace(&self, selector: &L::Selector) -> String {
        self.loader.namespace(selector)
    }

    pub fn cache_key(&self, namespace: &str) -> String {
        format!("{}{}", self.prefix(), namespace)
    }

    /// Cached data for `selector`, loading and storing it on a miss.
    ///
    /// Cache failures degrade to a load; they never fail the read.
    pub fn read(&self, selector: &L::Selector) -> DataResult<L::Data> {
        let key = self.cache_key(&self.namespace(selector));
        match self.cache.get(&key) {
            Ok(Some(cached)) => match serde_json::from_value(cached) {
                Ok(data) => {
                    debug!(key = %key, "registry hit");
                    return Ok(data);
                }
                Err(e) => warn!(key = %key, error = %e, "discarding undecodable registry entry"),
            },
            Ok(None) => debug!(key = %key, "registry miss"),
            Err(e) => warn!(key = %key, error = %e, "registry cache read failed"),
        }

        let data = self.loader.load(selector)?;
        match serde_json::to_value(&data) {
            Ok(value) => {
                if let Err(e) = self.cache.set(&key, &value) {
                    warn!(key = %key, error = %e, "registry cache write failed");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "registry data is not serializable"),
        }
        Ok(data)
    }

    /// Drop the cached data for `selector` and load it again.
    pub fn create(&self, selector: &L::Selector) -> DataResult<L::Data> {
        self.clear(&self.namespace(selector))?;
        self.read(selector)
    }

    /// Evict one namespace, or the whole family when the loader asks for it.
    pub fn clear(&self, namespace: &str) -> DataResult<()> {
        if self.loader.clear_whole_family() {
            self.flush()?;
        } else {
            self.cache.remove(&self.cache_key(namespace))?;
        }
        Ok(())
    }

    /// Evict every namespace of this registry type.
    pub fn flush(&self) -> DataResult<usize> {
        let removed = self.cache.clear_prefix(&self.prefix())?;
        debug!(registry = self.loader.name(), removed, "registry flushed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::DataError;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Loader over an in-memory "table" that counts its invocations.
    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
        source: Mutex<BTreeMap<String, i64>>,
        family: bool,
    }

    impl RegistryLoader for CountingLoader {
        type Selector = String;
        type Data = i64;

        fn name(&self) -> &'static str {
            "counter"
        }

        fn namespace(&self, selector: &String) -> String {
            selector.clone()
        }

        fn load(&self, selector: &String) -> DataResult<i64> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(*self.source.lock().unwrap().get(selector).unwrap_or(&0))
        }

        fn clear_whole_family(&self) -> bool {
            self.family
        }
    }

    fn registry(family: bool) -> (Registry<CountingLoader>, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let loader = CountingLoader {
            family,
            ..CountingLoader::default()
        };
        loader.source.lock().unwrap().insert("front".into(), 1);
        (Registry::new(loader, cache.clone()), cache)
    }

    fn loads(r: &Registry<CountingLoader>) -> usize {
        r.loader().loads.load(Ordering::SeqCst)
    }

    #[test]
    fn second_read_is_a_cache_hit() {
        let (r, cache) = registry(false);
        assert_eq!(r.read(&"front".into()).unwrap(), 1);
        assert_eq!(r.read(&"front".into()).unwrap(), 1);
        assert_eq!(loads(&r), 1);
        assert_eq!(cache.get("registry.counter.front").unwrap(), Some(json!(1)));
    }

    #[test]
    fn clear_then_read_returns_current_source_data() {
        let (r, _) = registry(false);
        r.read(&"front".into()).unwrap();
        r.loader().source.lock().unwrap().insert("front".into(), 2);

        // stale until cleared
        assert_eq!(r.read(&"front".into()).unwrap(), 1);
        r.clear("front").unwrap();
        assert_eq!(r.read(&"front".into()).unwrap(), 2);
        assert_eq!(loads(&r), 2);
    }

    #[test]
    fn create_forces_reload() {
        let (r, _) = registry(false);
        r.read(&"front".into()).unwrap();
        r.loader().source.lock().unwrap().insert("front".into(), 5);
        assert_eq!(r.create(&"front".into()).unwrap(), 5);
        assert_eq!(loads(&r), 2);
    }

    #[test]
    fn clear_touches_only_its_namespace_unless_family() {
        let (r, cache) = registry(false);
        r.read(&"front".into()).unwrap();
        r.read(&"admin".into()).unwrap();
        r.clear("admin").unwrap();
        assert!(cache.get("registry.counter.front").unwrap().is_some());

        let (r, cache) = registry(true);
        r.read(&"front".into()).unwrap();
        r.read(&"admin".into()).unwrap();
        r.clear("admin").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn flush_drops_every_namespace_of_the_type_only() {
        let (r, cache) = registry(false);
        cache.set("registry.other.front", &json!(9)).unwrap();
        r.read(&"front".into()).unwrap();
        r.read(&"admin".into()).unwrap();
        assert_eq!(r.flush().unwrap(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn undecodable_entry_counts_as_miss() {
        let (r, cache) = registry(false);
        cache.set("registry.counter.front", &json!("not a number")).unwrap();
        assert_eq!(r.read(&"front".into()).unwrap(), 1);
        assert_eq!(loads(&r), 1);
        assert_eq!(cache.get("registry.counter.front").unwrap(), Some(json!(1)));
    }

    struct BrokenCache;

    impl CacheBackend for BrokenCache {
        fn get(&self, _key: &str) -> DataResult<Option<Value>> {
            Err(DataError::cache("backend down"))
        }

        fn set(&self, _key: &str, _value: &Value) -> DataResult<()> {
            Err(DataError::cache("backend down"))
        }

        fn remove(&self, _key: &str) -> DataResult<bool> {
            Err(DataError::cache("backend down"))
        }

        fn clear_prefix(&self, _prefix: &str) -> DataResult<usize> {
            Err(DataError::cache("backend down"))
        }
    }

    #[test]
    fn broken_cache_falls_back_to_loader() {
        let r = Registry::new(CountingLoader::default(), Arc::new(BrokenCache));
        assert_eq!(r.read(&"front".into()).unwrap(), 0);
        assert_eq!(r.read(&"front".into()).unwrap(), 0);
        assert_eq!(loads(&r), 2);
        assert!(r.clear("front").is_err());
    }
}
