//! Deterministic entry derivation for the writer workload.
//!
//! Worker `w` writes iteration `i` under key `w * I + i` with value `i`, so
//! keys are unique across all `W * I` writes and the expected content of the
//! map is known without recording anything during the run.

/// Key written by `worker` at `iteration`, with `iterations` writes per worker.
///
/// Unique for every `(worker, iteration)` with `iteration < iterations`.
#[must_use]
#[inline(always)]
pub const fn entry_key(worker: usize, iteration: usize, iterations: usize) -> u64 {
    (worker as u64) * (iterations as u64) + (iteration as u64)
}

/// Value written at `iteration`.
#[must_use]
#[inline(always)]
pub const fn entry_value(iteration: usize) -> u64 {
    iteration as u64
}

/// Recover `(worker, iteration)` from a key produced by [`entry_key`].
///
/// Returns `None` when `iterations` is zero, since no key exists then.
#[must_use]
#[expect(clippy::cast_possible_truncation)]
pub const fn split_key(key: u64, iterations: usize) -> Option<(usize, usize)> {
    if iterations == 0 {
        return None;
    }
    let per_worker = iterations as u64;
    Some(((key / per_worker) as usize, (key % per_worker) as usize))
}

/// Value that must be stored under `key` after an uncontended run.
#[must_use]
pub const fn expected_value(key: u64, iterations: usize) -> Option<u64> {
    match split_key(key, iterations) {
        Some((_, iteration)) => Some(entry_value(iteration)),
        None => None,
    }
}
