//! `RwLockMap` - shared lock for reads, exclusive lock for writes.

use std::collections::HashMap;
use std::fmt as StdFmt;
use std::hash::Hash;
use std::ops::ControlFlow;

use parking_lot::RwLock;

use crate::strategy::{ConcurrentMap, LenConsistency, Strategy};

/// A `HashMap` guarded by a reader-writer lock.
///
/// `get`, `len` and `for_each` take the shared lock and run alongside each
/// other; `put` takes the exclusive lock and blocks every reader and writer.
/// The reader bookkeeping makes each acquisition dearer than a plain mutex,
/// so pure-write workloads run slower than [`super::MutexMap`] while
/// read-heavy workloads scale better.
pub struct RwLockMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash, V> RwLockMap<K, V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty map with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }
}

impl<K: Eq + Hash, V> Default for RwLockMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StdFmt::Debug for RwLockMap<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("RwLockMap")
            .field("len", &self.inner.read().len())
            .finish()
    }
}

impl<K, V> ConcurrentMap<K, V> for RwLockMap<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    #[inline]
    fn put(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    #[inline]
    fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    #[inline]
    fn len(&self) -> usize {
        self.inner.read().len()
    }

    fn for_each(&self, visit: &mut dyn FnMut(&K, &V) -> ControlFlow<()>) -> usize {
        let map = self.inner.read();
        let mut visited: usize = 0;
        for (key, value) in map.iter() {
            visited += 1;
            if visit(key, value).is_break() {
                break;
            }
        }
        visited
    }

    fn strategy(&self) -> Strategy {
        Strategy::RwLock
    }

    fn len_consistency(&self) -> LenConsistency {
        LenConsistency::Exact
    }
}
