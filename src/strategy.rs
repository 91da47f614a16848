//! The map contract shared by every synchronization strategy.
//!
//! All three strategies implement [`ConcurrentMap`] so the harness can pick
//! one at run time through [`Strategy::build`] and drive it through an
//! `Arc<dyn ConcurrentMap<K, V>>`.

use std::fmt as StdFmt;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, MapError};
use crate::map::{MutexMap, RwLockMap, SnapshotMap};

// ============================================================================
//  Strategy
// ============================================================================

/// Synchronization scheme backing a map instance.
///
/// Chosen once per run; a map never changes strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Sharded map with lock-free reads from published snapshots and a
    /// locked staging area for new keys ([`SnapshotMap`]).
    Snapshot,

    /// One exclusive lock around the whole map ([`MutexMap`]).
    Mutex,

    /// Shared lock for reads, exclusive lock for writes ([`RwLockMap`]).
    RwLock,
}

impl Strategy {
    /// Every strategy, in reporting order.
    pub const ALL: [Self; 3] = [Self::Snapshot, Self::Mutex, Self::RwLock];

    /// Stable lowercase name used on the command line and in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Mutex => "mutex",
            Self::RwLock => "rwlock",
        }
    }

    /// Instantiate an empty map using this strategy.
    #[must_use]
    pub fn build<K, V>(self) -> Arc<dyn ConcurrentMap<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        match self {
            Self::Snapshot => Arc::new(SnapshotMap::new()),
            Self::Mutex => Arc::new(MutexMap::new()),
            Self::RwLock => Arc::new(RwLockMap::new()),
        }
    }

    /// Instantiate an empty map pre-sized for `capacity` entries.
    ///
    /// Only the locked strategies pre-allocate; the snapshot map rebuilds its
    /// shards on promotion and ignores the hint.
    #[must_use]
    pub fn build_with_capacity<K, V>(self, capacity: usize) -> Arc<dyn ConcurrentMap<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        match self {
            Self::Snapshot => Arc::new(SnapshotMap::new()),
            Self::Mutex => Arc::new(MutexMap::with_capacity(capacity)),
            Self::RwLock => Arc::new(RwLockMap::with_capacity(capacity)),
        }
    }
}

impl StdFmt::Display for Strategy {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" | "lock-free" | "lockfree" | "sync-map" | "syncmap" => Ok(Self::Snapshot),
            "mutex" | "exclusive" => Ok(Self::Mutex),
            "rwlock" | "rw-lock" | "shared" => Ok(Self::RwLock),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

// ============================================================================
//  LenConsistency
// ============================================================================

/// How far `len` can be trusted while writers are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LenConsistency {
    /// O(1) count taken under the map's lock; exact at the instant it is read.
    Exact,

    /// O(n) traversal of a point-in-time view. Concurrent with writers it may
    /// undercount; once every writer has finished it is exact.
    Weak,
}

// ============================================================================
//  ConcurrentMap
// ============================================================================

/// A key-value map that many threads may write and read at once.
///
/// Writes to distinct keys are never lost. Concurrent writes to the same key
/// resolve last-write-wins.
pub trait ConcurrentMap<K, V>: Send + Sync {
    /// Insert or overwrite `key`, returning the previous value if any.
    fn put(&self, key: K, value: V) -> Option<V>;

    /// Read the current value for `key`.
    fn get(&self, key: &K) -> Option<V>;

    /// Number of entries. See [`ConcurrentMap::len_consistency`] for the cost
    /// and the guarantee of each strategy.
    fn len(&self) -> usize;

    /// Visit entries until `visit` breaks. Returns the number of entries visited,
    /// including the one that broke.
    ///
    /// The locked strategies hold their lock for the whole traversal, so `visit`
    /// must not write to the same map.
    fn for_each(&self, visit: &mut dyn FnMut(&K, &V) -> ControlFlow<()>) -> usize;

    /// Strategy backing this map.
    fn strategy(&self) -> Strategy;

    /// Guarantee offered by [`ConcurrentMap::len`].
    fn len_consistency(&self) -> LenConsistency;

    /// Read `key`, reporting an absent key as [`MapError::KeyNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if `key` was never written.
    fn lookup(&self, key: &K) -> Result<V, MapError> {
        self.get(key).ok_or(MapError::KeyNotFound)
    }

    /// Check if the map has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("snapshot".parse::<Strategy>(), Ok(Strategy::Snapshot));
        assert_eq!("Lock-Free".parse::<Strategy>(), Ok(Strategy::Snapshot));
        assert_eq!("sync-map".parse::<Strategy>(), Ok(Strategy::Snapshot));
        assert_eq!("exclusive".parse::<Strategy>(), Ok(Strategy::Mutex));
        assert_eq!(" rwlock ".parse::<Strategy>(), Ok(Strategy::RwLock));
        assert_eq!("shared".parse::<Strategy>(), Ok(Strategy::RwLock));
        assert_eq!(
            "btree".parse::<Strategy>(),
            Err(ConfigError::UnknownStrategy("btree".to_string()))
        );
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.to_string().parse::<Strategy>(), Ok(strategy));
        }
    }

    #[test]
    fn build_reports_its_strategy() {
        for strategy in Strategy::ALL {
            let map = strategy.build::<u64, u64>();
            assert_eq!(map.strategy(), strategy);
            assert!(map.is_empty());
        }
    }

    #[test]
    fn only_snapshot_len_is_weak() {
        assert_eq!(
            Strategy::Snapshot.build::<u64, u64>().len_consistency(),
            LenConsistency::Weak
        );
        assert_eq!(
            Strategy::Mutex.build::<u64, u64>().len_consistency(),
            LenConsistency::Exact
        );
        assert_eq!(
            Strategy::RwLock.build::<u64, u64>().len_consistency(),
            LenConsistency::Exact
        );
    }

    #[test]
    fn lookup_reports_key_not_found() {
        for strategy in Strategy::ALL {
            let map = strategy.build::<u64, u64>();
            assert_eq!(map.lookup(&7), Err(MapError::KeyNotFound));
            map.put(7, 70);
            assert_eq!(map.lookup(&7), Ok(70));
        }
    }
}
