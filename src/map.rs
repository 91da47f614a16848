//! The three map strategies.
//!
//! - [`SnapshotMap`]: sharded, lock-free reads from published snapshots.
//! - [`MutexMap`]: one exclusive lock.
//! - [`RwLockMap`]: shared lock for reads, exclusive lock for writes.

mod mutex;
mod reclaim;
mod rwlock;
mod snapshot;



pub use mutex::MutexMap;
pub use rwlock::RwLockMap;
pub use snapshot::{SnapshotMap, SnapshotStats};
