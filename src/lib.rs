//! # `syncmap_bench`
//!
//! A harness comparing synchronization strategies for a shared key-value map
//! under many concurrent writers.
//!
//! Three strategies implement the same [`ConcurrentMap`] contract:
//!
//! | Strategy | Reads | Writes | `len` |
//! |----------|-------|--------|-------|
//! | [`Strategy::Snapshot`] | lock-free on published keys | per-shard lock for new keys | weak, O(n) |
//! | [`Strategy::Mutex`] | exclusive lock | exclusive lock | exact, O(1) |
//! | [`Strategy::RwLock`] | shared lock | exclusive lock | exact, O(1) |
//!
//! The [`harness`] spawns `W` writers that each put `I` unique keys, joins
//! them, then reads the map back and checks that exactly `W * I` entries are
//! present with the values written.
//!
//! ```rust
//! use syncmap_bench::{HarnessConfig, Strategy, harness};
//!
//! let config = HarnessConfig::new(Strategy::Snapshot, 4, 100)?;
//! let report = harness::run(&config)?;
//! assert_eq!(report.count, 400);
//! # Ok::<(), syncmap_bench::HarnessError>(())
//! ```
//!
//! The [`counter`] module contrasts an atomic counter with a racy
//! read-then-write counter under the same worker layout, showing lost
//! updates.
//!
//! ## Thread Safety
//!
//! Every map is `Send + Sync` when its keys and values are. Maps are shared
//! through `Arc`; no map is a process-wide global.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always)]

mod tracing_helpers;

pub mod config;
pub mod counter;
pub mod error;
pub mod harness;
pub mod key;
pub mod map;
pub mod ordering;
pub mod report;
pub mod strategy;

// Re-export main types for convenience
pub use config::HarnessConfig;
pub use counter::{AtomicCounter, Counter, RacyCounter};
pub use error::{ConfigError, HarnessError, MapError};
pub use map::{MutexMap, RwLockMap, SnapshotMap, SnapshotStats};
pub use report::{CounterReport, OverlapReport, Report};
pub use strategy::{ConcurrentMap, LenConsistency, Strategy};

/// Install a console subscriber filtered by `RUST_LOG`.
///
/// Defaults to `syncmap_bench=info`. Safe to call more than once; only the
/// first subscriber is installed.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("syncmap_bench=info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// No-op without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}
