//! `MutexMap` - every operation behind one exclusive lock.

use std::collections::HashMap;
use std::fmt as StdFmt;
use std::hash::Hash;
use std::ops::ControlFlow;

use parking_lot::Mutex;

use crate::strategy::{ConcurrentMap, LenConsistency, Strategy};

/// A `HashMap` guarded by a single [`Mutex`].
///
/// Reads, writes, `len` and `for_each` all serialize on the same lock. Each
/// critical section is one hash map operation, except `for_each` which holds
/// the lock for the traversal.
pub struct MutexMap<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash, V> MutexMap<K, V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Create an empty map with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Consume the map and return the underlying `HashMap`.
    #[must_use]
    pub fn into_inner(self) -> HashMap<K, V> {
        self.inner.into_inner()
    }
}

impl<K: Eq + Hash, V> Default for MutexMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StdFmt::Debug for MutexMap<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("MutexMap")
            .field("len", &self.inner.lock().len())
            .finish()
    }
}

impl<K, V> ConcurrentMap<K, V> for MutexMap<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    #[inline]
    fn put(&self, key: K, value: V) -> Option<V> {
        self.inner.lock().insert(key, value)
    }

    #[inline]
    fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    #[inline]
    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn for_each(&self, visit: &mut dyn FnMut(&K, &V) -> ControlFlow<()>) -> usize {
        let map = self.inner.lock();
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
        Strategy::Mutex
    }

    fn len_consistency(&self) -> LenConsistency {
        LenConsistency::Exact
    }
}
