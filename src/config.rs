//! Run configuration.
//!
//! A run is fixed by its strategy, its worker count `W` and the iterations
//! each worker performs `I`. Values come from the command line or from the
//! environment:
//!
//! - `SYNCBENCH_STRATEGY`: `snapshot` (default), `mutex` or `rwlock`
//! - `SYNCBENCH_WORKERS`: worker count (default 50)
//! - `SYNCBENCH_ITERATIONS`: iterations per worker (default 1000)
//! - `SYNCBENCH_SHARDS`: shard count of the snapshot map (power of two)

use std::env;
use std::sync::OnceLock;

use serde::Serialize;

use crate::error::ConfigError;
use crate::strategy::Strategy;

/// Worker count used by the reference scenario.
pub const DEFAULT_WORKERS: usize = 50;

/// Iterations per worker used by the reference scenario.
pub const DEFAULT_ITERATIONS: usize = 1000;

/// Environment variable selecting the strategy.
pub const STRATEGY_ENV: &str = "SYNCBENCH_STRATEGY";

/// Environment variable selecting the worker count.
pub const WORKERS_ENV: &str = "SYNCBENCH_WORKERS";

/// Environment variable selecting the iterations per worker.
pub const ITERATIONS_ENV: &str = "SYNCBENCH_ITERATIONS";

/// Environment variable overriding the snapshot map's shard count.
pub const SHARDS_ENV: &str = "SYNCBENCH_SHARDS";

/// Validated parameters of one harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HarnessConfig {
    strategy: Strategy,
    workers: usize,
    iterations: usize,
}

impl HarnessConfig {
    /// Build a configuration.
    ///
    /// Zero workers or zero iterations are valid and describe an empty run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TooManyEntries`] if `workers * iterations`
    /// does not fit a `u64` key.
    pub fn new(strategy: Strategy, workers: usize, iterations: usize) -> Result<Self, ConfigError> {
        let fits = workers
            .checked_mul(iterations)
            .is_some_and(|total| u64::try_from(total).is_ok());
        if !fits {
            return Err(ConfigError::TooManyEntries {
                workers,
                iterations,
            });
        }
        Ok(Self {
            strategy,
            workers,
            iterations,
        })
    }

    /// Build a configuration from `SYNCBENCH_*` variables, falling back to the
    /// reference scenario for anything unset.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an unknown strategy, a non-numeric count
    /// or an oversized run.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|var| env::var(var).ok())
    }

    /// [`Self::from_env`] over an arbitrary variable lookup.
    fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let strategy = match lookup(STRATEGY_ENV) {
            Some(raw) => raw.parse()?,
            None => Strategy::Snapshot,
        };
        let workers = parse_count(WORKERS_ENV, lookup(WORKERS_ENV))?.unwrap_or(DEFAULT_WORKERS);
        let iterations =
            parse_count(ITERATIONS_ENV, lookup(ITERATIONS_ENV))?.unwrap_or(DEFAULT_ITERATIONS);
        Self::new(strategy, workers, iterations)
    }

    /// Same run with another strategy.
    #[must_use]
    pub const fn with_strategy(self, strategy: Strategy) -> Self {
        Self { strategy, ..self }
    }

    /// Strategy under test.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Worker count `W`.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Iterations per worker `I`.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Entries the map must hold after the barrier: `W * I`.
    #[must_use]
    pub const fn expected_entries(&self) -> usize {
        // Checked in `new`.
        self.workers * self.iterations
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Snapshot,
            workers: DEFAULT_WORKERS,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

fn parse_count(var: &'static str, raw: Option<String>) -> Result<Option<usize>, ConfigError> {
    raw.map(|raw| {
        raw.trim()
            .parse()
            .map_err(|_| ConfigError::InvalidCount { var, value: raw })
    })
    .transpose()
}

/// Shard count used by [`crate::map::SnapshotMap::new`].
///
/// `SYNCBENCH_SHARDS` wins when it holds a non-zero power of two; otherwise
/// four shards per available core, rounded up to a power of two. Read once
/// per process.
pub fn default_shard_count() -> usize {
    static SHARDS: OnceLock<usize> = OnceLock::new();
    *SHARDS.get_or_init(|| {
        env::var(SHARDS_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|n| n.is_power_of_two())
            .unwrap_or_else(|| {
                let cores = std::thread::available_parallelism().map_or(1, usize::from);
                (cores * 4).next_power_of_two()
            })
    })
}
