//! Atomic versus racy counters.
//!
//! Both counters are incremented by the same `W` workers `I` times each,
//! with no locking. [`AtomicCounter`] uses one hardware fetch-and-add per
//! increment and always ends at `W * I`. [`RacyCounter`] reads and then
//! writes in two separate steps; when two workers interleave between those
//! steps one increment overwrites the other and is lost.
//!
//! The racy counter keeps its value in an atomic so the lost update is a
//! logic race, not a data race: the program stays well defined while still
//! dropping increments.

use std::sync::atomic::AtomicU64;

use crate::ordering::RELAXED;

/// A counter shared by many incrementing threads.
pub trait Counter: Send + Sync {
    /// Add one.
    fn increment(&self);

    /// Current value.
    fn value(&self) -> u64;
}

/// Counter incremented with an atomic fetch-and-add.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Create a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
}

impl Counter for AtomicCounter {
    #[inline]
    fn increment(&self) {
        self.value.fetch_add(1, RELAXED);
    }

    #[inline]
    fn value(&self) -> u64 {
        self.value.load(RELAXED)
    }
}

/// Counter incremented with a separate read and write.
///
/// Concurrent increments may be lost. Single-threaded use is exact.
#[derive(Debug, Default)]
pub struct RacyCounter {
    value: AtomicU64,
}

impl RacyCounter {
    /// Create a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
}

impl Counter for RacyCounter {
    #[inline]
    fn increment(&self) {
        let current: u64 = self.value.load(RELAXED);
        self.value.store(current.wrapping_add(1), RELAXED);
    }

    #[inline]
    fn value(&self) -> u64 {
        self.value.load(RELAXED)
    }
}
