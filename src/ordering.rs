//! Memory orderings used by the lock-free snapshot map and the counters.
//!
//! Named constants keep the pairing between publishers and readers visible
//! at each access point.

use std::sync::atomic::Ordering;

/// Loading a published snapshot or slot value.
/// Pairs with [`PUBLISH_ORD`].
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Publishing a new snapshot pointer or a new slot value.
/// Pairs with [`READ_ORD`].
pub const PUBLISH_ORD: Ordering = Ordering::Release;

/// Swapping a slot value: must observe the previous value and publish the new one.
pub const SWAP_ORD: Ordering = Ordering::AcqRel;

/// Statistics and counters that carry no synchronization duty.
pub const RELAXED: Ordering = Ordering::Relaxed;
