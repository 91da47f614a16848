//! Error types for map lookups, harness runs and configuration.

use thiserror::Error;

use crate::strategy::Strategy;

/// Errors returned by map lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// The key has never been written. Not fatal: `get` reports the same
    /// condition as `None`.
    #[error("key not found")]
    KeyNotFound,
}

/// Errors that end a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The map disagrees with what the workers wrote after the barrier.
    ///
    /// This is a synchronization bug in the strategy under test.
    #[error(
        "{strategy}: invariant violated: expected {expected} entries, observed {observed} \
         (len {len}, {missing} missing, {corrupted} corrupted)"
    )]
    InvariantViolated {
        /// Strategy under test.
        strategy: Strategy,
        /// `workers * iterations`.
        expected: u64,
        /// Entries visited by `for_each`.
        observed: u64,
        /// Value reported by `len`.
        len: u64,
        /// Keys that were written but cannot be read back.
        missing: u64,
        /// Keys whose stored value differs from the value written.
        corrupted: u64,
    },

    /// A worker thread panicked before finishing its iterations.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Index of the worker.
        worker: usize,
    },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[from] std::io::Error),

    /// The run configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while building a run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Strategy name did not match any variant.
    #[error("unknown strategy `{0}` (expected snapshot, mutex or rwlock)")]
    UnknownStrategy(String),

    /// `workers * iterations` does not fit the key space.
    #[error("{workers} workers x {iterations} iterations overflows the key space")]
    TooManyEntries {
        /// Requested worker count.
        workers: usize,
        /// Requested iterations per worker.
        iterations: usize,
    },

    /// An environment variable holds something other than a count.
    #[error("{var}={value:?} is not a valid count")]
    InvalidCount {
        /// Variable name.
        var: &'static str,
        /// Raw value found.
        value: String,
    },

    /// Shard count must be a non-zero power of two.
    #[error("shard count {0} is not a non-zero power of two")]
    InvalidShardCount(usize),
}
