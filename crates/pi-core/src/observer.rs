//! Change notifications fired by table gateways.

use crate::db::{Set, Where};
use crate::gateway::Row;
use std::sync::{Arc, RwLock};

/// Receives table change events. Both hooks default to no-ops.
pub trait TableObserver: Send + Sync {
    /// Called once after an UPDATE statement succeeds.
    fn table_updated(&self, _table: &str, _set: &Set, _filter: Option<&Where>) {}

    /// Called once per row, before the row is removed.
    fn row_deleted(&self, _table: &str, _row: &Row) {}
}

/// Fan-out of table events to every attached observer.
#[derive(Default)]
pub struct ObserverHub {
    observers: RwLock<Vec<Arc<dyn TableObserver>>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, observer: Arc<dyn TableObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Observers are cloned out so a hook may attach or touch the database freely.
    fn snapshot(&self) -> Vec<Arc<dyn TableObserver>> {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn notify_updated(&self, table: &str, set: &Set, filter: Option<&Where>) {
        let observers = self.snapshot();
        tracing::trace!(table, observers = observers.len(), "table updated");
        for observer in observers {
            observer.table_updated(table, set, filter);
        }
    }

    pub(crate) fn notify_deleted(&self, table: &str, row: &Row) {
        for observer in self.snapshot() {
            observer.row_deleted(table, row);
        }
    }
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        updates: AtomicUsize,
    }

    impl TableObserver for Counter {
        fn table_updated(&self, _table: &str, _set: &Set, _filter: Option<&Where>) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn every_attached_observer_is_notified() {
        let hub = ObserverHub::new();
        assert!(hub.is_empty());
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        hub.attach(a.clone());
        hub.attach(b.clone());

        hub.notify_updated("role", &Set::new().value("active", 0), None);

        assert_eq!(a.updates.load(Ordering::SeqCst), 1);
        assert_eq!(b.updates.load(Ordering::SeqCst), 1);
    }
}
