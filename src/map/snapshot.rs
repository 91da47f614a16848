//! `SnapshotMap` - sharded map with lock-free reads.
//!
//! Each shard keeps two views of its entries:
//!
//! 1. **stable snapshot**: an immutable `HashMap` published through one
//!    `AtomicPtr`. Readers load it under a seize guard and never lock.
//! 2. **staging**: a `HashMap` behind the shard mutex holding every key of the
//!    snapshot plus keys written since the last promotion. The snapshot's
//!    `amended` flag says staging holds keys the snapshot lacks.
//!
//! Both views share `Arc<Slot<V>>` cells, so overwriting a key that is
//! already in the snapshot is a single pointer swap on its slot with no lock.
//! Only new keys take the shard mutex.
//!
//! # Promotion
//!
//! Lookups that miss the snapshot and fall through to staging are counted.
//! When the misses reach the staging size, staging is published as the next
//! snapshot (one pointer store) and the old snapshot is retired through
//! seize. `for_each` and `len` promote eagerly so they traverse everything
//! written before the call.
//!
//! A reader therefore sees either the whole pre-promotion snapshot or the
//! whole post-promotion snapshot, never a mix of the two.
//!
//! # Consistency of `len` and `for_each`
//!
//! Shards are visited one after another, each from its own point-in-time
//! snapshot. While writers are active the traversal may miss keys written
//! during the walk (`len` may undercount). Once every writer has finished,
//! both are exact.

use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::fmt as StdFmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize};

use parking_lot::Mutex;
use seize::{Collector, Guard, LocalGuard};

use super::reclaim::reclaim_boxed;
use crate::config::default_shard_count;
use crate::error::ConfigError;
use crate::ordering::{PUBLISH_ORD, READ_ORD, RELAXED, SWAP_ORD};
use crate::strategy::{ConcurrentMap, LenConsistency, Strategy};
use crate::tracing_helpers::{debug_log, trace_log};

// ============================================================================
//  Slot
// ============================================================================

/// A value cell shared by the snapshot and staging views of a shard.
///
/// The pointer is never null. Replaced values are retired through seize.
struct Slot<V> {
    value: AtomicPtr<V>,
    _marker: PhantomData<Box<V>>,
}

impl<V> Slot<V> {
    fn new(value: V) -> Self {
        Self {
            value: AtomicPtr::new(Box::into_raw(Box::new(value))),
            _marker: PhantomData,
        }
    }
}

impl<V: Clone> Slot<V> {
    /// Clone the current value.
    #[inline]
    fn load(&self, guard: &LocalGuard<'_>) -> V {
        let ptr: *mut V = guard.protect(&self.value, READ_ORD);
        // SAFETY: the pointer is never null and the guard keeps it alive
        // until we are done cloning.
        unsafe { (*ptr).clone() }
    }

    /// Replace the value, returning a clone of the one it displaced.
    #[inline]
    fn replace(&self, value: V, guard: &LocalGuard<'_>) -> V {
        let new_ptr: *mut V = Box::into_raw(Box::new(value));
        let old_ptr: *mut V = self.value.swap(new_ptr, SWAP_ORD);

        // SAFETY: old_ptr was unlinked by our swap; no other writer can
        // retire it. Readers that loaded it are protected by their guards.
        unsafe {
            let previous: V = (*old_ptr).clone();
            guard.defer_retire(old_ptr, reclaim_boxed::<V>);
            previous
        }
    }
}

impl<V> Drop for Slot<V> {
    fn drop(&mut self) {
        // A slot is dropped when the last snapshot or staging map holding it
        // goes away; no reader can reach it any more.
        let ptr: *mut V = *self.value.get_mut();
        // SAFETY: ptr came from Box::into_raw and is owned by this slot.
        unsafe { drop(Box::from_raw(ptr)) };
    }
}

type Entries<K, V> = HashMap<K, Arc<Slot<V>>>;

// ============================================================================
//  Shard
// ============================================================================

/// Immutable view published to lock-free readers.
struct Snapshot<K, V> {
    entries: Entries<K, V>,
    /// Staging holds keys missing from `entries`.
    amended: AtomicBool,
}

impl<K, V> Snapshot<K, V> {
    fn boxed(entries: Entries<K, V>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            entries,
            amended: AtomicBool::new(false),
        }))
    }
}

/// Mutex-protected side of a shard.
struct Staging<K, V> {
    /// `None` until a key is written that the snapshot lacks.
    entries: Option<Entries<K, V>>,
    /// Lookups that had to consult `entries` since the last promotion.
    misses: usize,
}

struct Shard<K, V> {
    stable: AtomicPtr<Snapshot<K, V>>,
    staging: Mutex<Staging<K, V>>,
    _marker: PhantomData<Box<Snapshot<K, V>>>,
}

impl<K, V> Shard<K, V> {
    fn new() -> Self {
        Self {
            stable: AtomicPtr::new(Snapshot::boxed(HashMap::new())),
            staging: Mutex::new(Staging {
                entries: None,
                misses: 0,
            }),
            _marker: PhantomData,
        }
    }

    /// Load the published snapshot.
    #[inline]
    fn snapshot<'g>(&self, guard: &'g LocalGuard<'_>) -> &'g Snapshot<K, V> {
        let ptr: *mut Snapshot<K, V> = guard.protect(&self.stable, READ_ORD);
        // SAFETY: the snapshot pointer is never null, and a snapshot is only
        // freed after retirement once every guard that loaded it is gone.
        unsafe { &*ptr }
    }
}

impl<K, V> Drop for Shard<K, V> {
    fn drop(&mut self) {
        let ptr: *mut Snapshot<K, V> = *self.stable.get_mut();
        // SAFETY: the current snapshot is owned by the shard; retired ones
        // belong to the collector.
        unsafe { drop(Box::from_raw(ptr)) };
    }
}

// ============================================================================
//  SnapshotStats
// ============================================================================

/// Counters describing the promotion activity of a [`SnapshotMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Number of shards.
    pub shards: usize,
    /// Staging maps published as snapshots since creation.
    pub promotions: usize,
}

// ============================================================================
//  SnapshotMap
// ============================================================================

/// Sharded concurrent map with lock-free reads and lock-free overwrites of
/// existing keys.
///
/// New keys go through a per-shard staging map that is promoted into the
/// lock-free snapshot once lookups have missed often enough, or before a
/// traversal. `len` is an O(n) walk with [`LenConsistency::Weak`].
pub struct SnapshotMap<K, V, S = RandomState> {
    shards: Box<[Shard<K, V>]>,
    hasher: S,
    promotions: AtomicUsize,
    // Declared last: retired snapshots are freed after the shards drop.
    collector: Collector,
}

impl<K, V> SnapshotMap<K, V, RandomState>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty map with the default shard count.
    ///
    /// The default is four shards per available core rounded up to a power
    /// of two, overridable with `SYNCBENCH_SHARDS`.
    #[must_use]
    pub fn new() -> Self {
        Self::build(default_shard_count(), RandomState::new())
    }

    /// Create an empty map with exactly `shards` shards.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidShardCount`] unless `shards` is a
    /// non-zero power of two.
    pub fn with_shard_count(shards: usize) -> Result<Self, ConfigError> {
        Self::with_shard_count_and_hasher(shards, RandomState::new())
    }
}

impl<K, V, S> SnapshotMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Create an empty map with `shards` shards and a custom shard hasher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidShardCount`] unless `shards` is a
    /// non-zero power of two.
    pub fn with_shard_count_and_hasher(shards: usize, hasher: S) -> Result<Self, ConfigError> {
        if !shards.is_power_of_two() {
            return Err(ConfigError::InvalidShardCount(shards));
        }
        Ok(Self::build(shards, hasher))
    }

    fn build(shards: usize, hasher: S) -> Self {
        debug_assert!(shards.is_power_of_two());
        Self {
            shards: (0..shards).map(|_| Shard::new()).collect(),
            hasher,
            promotions: AtomicUsize::new(0),
            collector: Collector::new(),
        }
    }

    /// Promotion counters.
    #[must_use]
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            shards: self.shards.len(),
            promotions: self.promotions.load(RELAXED),
        }
    }

    #[inline]
    #[expect(clippy::cast_possible_truncation)]
    fn shard_index(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) as usize) & (self.shards.len() - 1)
    }

    #[inline]
    fn shard(&self, key: &K) -> &Shard<K, V> {
        &self.shards[self.shard_index(key)]
    }

    /// Publish the shard's staging map as its snapshot.
    ///
    /// Caller holds the shard's staging lock, which serializes every store to
    /// `shard.stable`.
    fn promote(&self, shard: &Shard<K, V>, staging: &mut Staging<K, V>, guard: &LocalGuard<'_>) {
        let Some(entries) = staging.entries.take() else {
            return;
        };

        let fresh: *mut Snapshot<K, V> = Snapshot::boxed(entries);
        let old: *mut Snapshot<K, V> = shard.stable.swap(fresh, SWAP_ORD);
        staging.misses = 0;

        // SAFETY: old was unlinked by the swap under the staging lock and is
        // retired exactly once. Readers holding it are protected by their guards.
        unsafe { guard.defer_retire(old, reclaim_boxed::<Snapshot<K, V>>) };

        self.promotions.fetch_add(1, RELAXED);
        debug_log!(
            promotions = self.promotions.load(RELAXED),
            "promoted staging into snapshot"
        );
    }

    /// Count a lookup that had to consult staging; promote once the misses
    /// have paid for the copy.
    fn record_miss(
        &self,
        shard: &Shard<K, V>,
        staging: &mut Staging<K, V>,
        guard: &LocalGuard<'_>,
    ) {
        staging.misses += 1;
        let staged: usize = staging.entries.as_ref().map_or(0, HashMap::len);
        if staging.misses >= staged {
            self.promote(shard, staging, guard);
        }
    }

    /// Load the shard's snapshot after promoting any staged keys.
    fn settled_snapshot<'g>(
        &self,
        shard: &Shard<K, V>,
        guard: &'g LocalGuard<'_>,
    ) -> &'g Snapshot<K, V> {
        let snapshot = shard.snapshot(guard);
        if !snapshot.amended.load(READ_ORD) {
            return snapshot;
        }

        let mut staging = shard.staging.lock();
        if shard.snapshot(guard).amended.load(READ_ORD) {
            self.promote(shard, &mut staging, guard);
        }
        drop(staging);
        shard.snapshot(guard)
    }
}

impl<K, V, S> ConcurrentMap<K, V> for SnapshotMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
    S: BuildHasher + Send + Sync,
{
    fn put(&self, key: K, value: V) -> Option<V> {
        let guard = self.collector.enter();
        let shard = self.shard(&key);

        // Fast path: key already published, swap without locking.
        if let Some(slot) = shard.snapshot(&guard).entries.get(&key) {
            return Some(slot.replace(value, &guard));
        }

        let mut staging = shard.staging.lock();
        // Re-check: a promotion may have published the key while we waited.
        let snapshot = shard.snapshot(&guard);
        if let Some(slot) = snapshot.entries.get(&key) {
            return Some(slot.replace(value, &guard));
        }

        if let Some(slot) = staging.entries.as_ref().and_then(|staged| staged.get(&key)) {
            return Some(slot.replace(value, &guard));
        }

        // New key. Seed staging from the snapshot if this is the first new key
        // since the last promotion.
        let staged = staging.entries.get_or_insert_with(|| {
            snapshot
                .entries
                .iter()
                .map(|(k, slot)| (k.clone(), Arc::clone(slot)))
                .collect()
        });
        staged.insert(key, Arc::new(Slot::new(value)));
        snapshot.amended.store(true, PUBLISH_ORD);
        trace_log!(staged = staged.len(), "staged new key");
        None
    }

    fn get(&self, key: &K) -> Option<V> {
        let guard = self.collector.enter();
        let shard = self.shard(key);

        let snapshot = shard.snapshot(&guard);
        if let Some(slot) = snapshot.entries.get(key) {
            return Some(slot.load(&guard));
        }
        if !snapshot.amended.load(READ_ORD) {
            return None;
        }

        let mut staging = shard.staging.lock();
        let snapshot = shard.snapshot(&guard);
        if let Some(slot) = snapshot.entries.get(key) {
            return Some(slot.load(&guard));
        }
        if !snapshot.amended.load(READ_ORD) {
            return None;
        }

        let found: Option<V> = staging
            .entries
            .as_ref()
            .and_then(|staged| staged.get(key))
            .map(|slot| slot.load(&guard));
        self.record_miss(shard, &mut staging, &guard);
        found
    }

    /// Walks every shard, promoting staged keys first.
    ///
    /// Cost is O(n) in the worst case: each shard with pending keys is
    /// promoted, and the next new key written to it copies the snapshot back
    /// into staging. Concurrent with writers the result may undercount.
    fn len(&self) -> usize {
        let guard = self.collector.enter();
        self.shards
            .iter()
            .map(|shard| self.settled_snapshot(shard, &guard).entries.len())
            .sum()
    }

    fn for_each(&self, visit: &mut dyn FnMut(&K, &V) -> ControlFlow<()>) -> usize {
        let guard = self.collector.enter();
        let mut visited: usize = 0;

        for shard in &self.shards {
            let snapshot = self.settled_snapshot(shard, &guard);
            for (key, slot) in &snapshot.entries {
                let value: V = slot.load(&guard);
                visited += 1;
                if visit(key, &value).is_break() {
                    return visited;
                }
            }
        }

        visited
    }

    fn strategy(&self) -> Strategy {
        Strategy::Snapshot
    }

    fn len_consistency(&self) -> LenConsistency {
        LenConsistency::Weak
    }
}

impl<K, V> Default for SnapshotMap<K, V, RandomState>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> StdFmt::Debug for SnapshotMap<K, V, S> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("SnapshotMap")
            .field("shards", &self.shards.len())
            .field("promotions", &self.promotions.load(RELAXED))
            .finish_non_exhaustive()
    }
}
