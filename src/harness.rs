//! Worker/barrier orchestration and the post-barrier read pass.
//!
//! A run spawns `W` writer threads. Writer `w` performs `I` sequential
//! `put(entry_key(w, i, I), entry_value(i))` calls against the shared map.
//! Joining every writer is the barrier: nothing is measured or read until all
//! of them have finished, except in [`run_overlapping`], which probes the map
//! with `for_each` while the writers are still active.
//!
//! The harness owns the map for the whole run and hands each writer its own
//! `Arc` clone; there is no process-wide state.

use std::hash::Hash;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::HarnessConfig;
use crate::counter::{AtomicCounter, Counter, RacyCounter};
use crate::error::{ConfigError, HarnessError};
use crate::key::{entry_key, entry_value};
use crate::report::{CounterReport, OverlapReport, Report};
use crate::strategy::ConcurrentMap;
use crate::tracing_helpers::{debug_log, error_log, trace_log};

/// The map type driven by the harness.
pub type SharedMap = Arc<dyn ConcurrentMap<u64, u64>>;

// ============================================================================
//  Spawning and joining
// ============================================================================

/// Spawn `count` threads named `{role}-{index}`, building each body with
/// `task(index)`.
///
/// If a spawn fails, the threads already started are joined before the
/// error is returned.
///
/// # Errors
///
/// [`HarnessError::Spawn`] if the OS refuses a thread.
pub fn spawn_workers<F, R, T>(
    count: usize,
    role: &str,
    task: T,
) -> Result<Vec<JoinHandle<R>>, HarnessError>
where
    T: Fn(usize) -> F,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let mut handles: Vec<JoinHandle<R>> = Vec::with_capacity(count);
    for index in 0..count {
        let spawned = thread::Builder::new()
            .name(format!("{role}-{index}"))
            .spawn(task(index));

        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                error_log!(role, index, error = %err, "failed to spawn worker");
                // Already-running workers finish before we report.
                let _ = join_workers(handles);
                return Err(HarnessError::Spawn(err));
            }
        }
    }
    debug_log!(role, count, "workers spawned");
    Ok(handles)
}

/// Join every handle and collect what each worker returned, in spawn order.
/// This is the barrier.
///
/// All handles are joined even after a panic; the first panicking worker is
/// reported.
///
/// # Errors
///
/// [`HarnessError::WorkerPanicked`] naming the first worker that panicked.
pub fn join_workers<R>(handles: Vec<JoinHandle<R>>) -> Result<Vec<R>, HarnessError> {
    let mut first_panic: Option<usize> = None;
    let mut results: Vec<R> = Vec::with_capacity(handles.len());
    for (worker, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(result) => results.push(result),
            Err(_) if first_panic.is_none() => {
                error_log!(worker, "worker panicked");
                first_panic = Some(worker);
            }
            Err(_) => {}
        }
    }
    match first_panic {
        Some(worker) => Err(HarnessError::WorkerPanicked { worker }),
        None => Ok(results),
    }
}

fn spawn_writers<M>(map: &Arc<M>, config: &HarnessConfig) -> Result<Vec<JoinHandle<()>>, HarnessError>
where
    M: ConcurrentMap<u64, u64> + ?Sized + 'static,
{
    let iterations: usize = config.iterations();
    spawn_workers(config.workers(), "writer", |worker| {
        let map = Arc::clone(map);
        move || {
            for iteration in 0..iterations {
                map.put(
                    entry_key(worker, iteration, iterations),
                    entry_value(iteration),
                );
            }
            trace_log!(worker, iterations, "writer finished");
        }
    })
}

// ============================================================================
//  Write phase
// ============================================================================

/// Run the write phase against `map` and wait for the barrier.
///
/// Returns the wall-clock time from the first spawn to the release of the
/// barrier. With zero workers or zero iterations nothing is spawned and the
/// elapsed time is zero.
///
/// # Errors
///
/// [`HarnessError::Spawn`] if a thread cannot be started,
/// [`HarnessError::WorkerPanicked`] if a writer panicked.
pub fn run_write_phase<M>(map: &Arc<M>, config: &HarnessConfig) -> Result<Duration, HarnessError>
where
    M: ConcurrentMap<u64, u64> + ?Sized + 'static,
{
    if config.workers() == 0 || config.iterations() == 0 {
        debug_log!(
            workers = config.workers(),
            iterations = config.iterations(),
            "empty run, nothing spawned"
        );
        return Ok(Duration::ZERO);
    }

    let start = Instant::now();
    let handles = spawn_writers(map, config)?;
    join_workers(handles)?;
    let elapsed = start.elapsed();

    debug_log!(
        strategy = %map.strategy(),
        elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        "write phase complete"
    );
    Ok(elapsed)
}

// ============================================================================
//  Verification
// ============================================================================

/// Check the post-barrier invariant: exactly `W * I` entries, each holding
/// the value its writer stored.
///
/// # Errors
///
/// [`HarnessError::InvariantViolated`] describing how many keys are missing
/// or corrupted and what `len` and `for_each` reported.
pub fn verify<M>(map: &M, config: &HarnessConfig) -> Result<(), HarnessError>
where
    M: ConcurrentMap<u64, u64> + ?Sized,
{
    let expected: usize = config.expected_entries();
    let iterations: usize = config.iterations();

    // `len` first: the snapshot map promotes staged keys here, so the lookups
    // below are served from the published snapshot.
    let len: usize = map.len();
    let observed: usize = map.for_each(&mut |_, _| ControlFlow::Continue(()));

    let mut missing: u64 = 0;
    let mut corrupted: u64 = 0;
    for worker in 0..config.workers() {
        for iteration in 0..iterations {
            match map.get(&entry_key(worker, iteration, iterations)) {
                None => missing += 1,
                Some(value) if value != entry_value(iteration) => corrupted += 1,
                Some(_) => {}
            }
        }
    }

    if missing == 0 && corrupted == 0 && len == expected && observed == expected {
        return Ok(());
    }

    error_log!(
        strategy = %map.strategy(),
        expected,
        len,
        observed,
        missing,
        corrupted,
        "invariant violated after barrier"
    );
    Err(HarnessError::InvariantViolated {
        strategy: map.strategy(),
        expected: expected as u64,
        observed: observed as u64,
        len: len as u64,
        missing,
        corrupted,
    })
}

// ============================================================================
//  Runs
// ============================================================================

/// Build the configured strategy, run the write phase, then measure and
/// verify.
///
/// # Errors
///
/// See [`run_write_phase`] and [`verify`].
pub fn run(config: &HarnessConfig) -> Result<Report, HarnessError> {
    let map: SharedMap = config
        .strategy()
        .build_with_capacity(config.expected_entries());
    run_with_map(&map, config)
}

/// Like [`run`] with a caller-supplied, empty map.
///
/// The report's strategy is the map's, not the config's.
///
/// # Errors
///
/// See [`run_write_phase`] and [`verify`].
pub fn run_with_map<M>(map: &Arc<M>, config: &HarnessConfig) -> Result<Report, HarnessError>
where
    M: ConcurrentMap<u64, u64> + ?Sized + 'static,
{
    let elapsed: Duration = run_write_phase(map, config)?;

    // Single-threaded read pass: every writer has joined.
    let count: usize = map.len();
    let visited: usize = map.for_each(&mut |_, _| ControlFlow::Continue(()));

    let report = Report {
        strategy: map.strategy(),
        workers: config.workers(),
        iterations: config.iterations(),
        expected: config.expected_entries(),
        count,
        visited,
        len_consistency: map.len_consistency(),
        elapsed,
    };

    verify(map.as_ref(), config)?;
    Ok(report)
}

/// Run the write phase while the calling thread probes the map with
/// `for_each`.
///
/// Up to `probes` traversals are issued, only while at least one writer is
/// still running; the probe never waits for the writers to go quiet. Each
/// observed count lies in `0..=W * I`. After the barrier the full invariant
/// is verified.
///
/// # Errors
///
/// See [`run_write_phase`] and [`verify`].
pub fn run_overlapping(config: &HarnessConfig, probes: usize) -> Result<OverlapReport, HarnessError> {
    let map: SharedMap = config
        .strategy()
        .build_with_capacity(config.expected_entries());
    run_overlapping_with_map(&map, config, probes)
}

/// Like [`run_overlapping`] with a caller-supplied, empty map.
///
/// # Errors
///
/// See [`run_write_phase`] and [`verify`].
pub fn run_overlapping_with_map<M>(
    map: &Arc<M>,
    config: &HarnessConfig,
    probes: usize,
) -> Result<OverlapReport, HarnessError>
where
    M: ConcurrentMap<u64, u64> + ?Sized + 'static,
{
    let start = Instant::now();
    let handles = if config.iterations() == 0 {
        Vec::new()
    } else {
        spawn_writers(map, config)?
    };

    let mut observed: Vec<usize> = Vec::with_capacity(probes);
    while observed.len() < probes && handles.iter().any(|h| !h.is_finished()) {
        observed.push(map.for_each(&mut |_, _| ControlFlow::Continue(())));
    }

    join_workers(handles)?;
    let elapsed = start.elapsed();
    debug_log!(probes = observed.len(), "overlapping probes finished");

    verify(map.as_ref(), config)?;
    Ok(OverlapReport {
        strategy: map.strategy(),
        expected: config.expected_entries(),
        observed,
        final_count: map.len(),
        elapsed,
    })
}

/// Collect up to `limit` entries, stopping the traversal early.
pub fn sample_entries<K, V, M>(map: &M, limit: usize) -> Vec<(K, V)>
where
    K: Clone,
    V: Clone,
    M: ConcurrentMap<K, V> + ?Sized,
{
    let mut sample: Vec<(K, V)> = Vec::with_capacity(limit);
    if limit == 0 {
        return sample;
    }
    map.for_each(&mut |key, value| {
        sample.push((key.clone(), value.clone()));
        if sample.len() >= limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    sample
}

/// Check that a map holds each `(key, value)` pair, for callers building
/// their own workloads.
pub fn missing_entries<K, V, M>(map: &M, entries: &[(K, V)]) -> usize
where
    K: Eq + Hash,
    V: PartialEq,
    M: ConcurrentMap<K, V> + ?Sized,
{
    entries
        .iter()
        .filter(|(key, value)| map.get(key).as_ref() != Some(value))
        .count()
}

// ============================================================================
//  Counter race
// ============================================================================

/// Increment an [`AtomicCounter`] and a [`RacyCounter`] from `workers`
/// threads, `iterations` times each, with no locking.
///
/// # Errors
///
/// [`ConfigError::TooManyEntries`] if `workers * iterations` overflows,
/// [`HarnessError::Spawn`] or [`HarnessError::WorkerPanicked`] from the workers.
pub fn run_counter_race(workers: usize, iterations: usize) -> Result<CounterReport, HarnessError> {
    let expected: u64 = workers
        .checked_mul(iterations)
        .and_then(|total| u64::try_from(total).ok())
        .ok_or(ConfigError::TooManyEntries {
            workers,
            iterations,
        })?;

    let atomic = Arc::new(AtomicCounter::new());
    let racy = Arc::new(RacyCounter::new());

    let start = Instant::now();
    let handles = spawn_workers(workers, "counter", |_| {
        let atomic = Arc::clone(&atomic);
        let racy = Arc::clone(&racy);
        move || {
            for _ in 0..iterations {
                atomic.increment();
                racy.increment();
            }
        }
    })?;
    join_workers(handles)?;
    let elapsed = start.elapsed();

    let report = CounterReport {
        workers,
        iterations,
        expected,
        atomic: atomic.value(),
        racy: racy.value(),
        elapsed,
    };
    debug_log!(
        expected,
        atomic = report.atomic,
        racy = report.racy,
        "counter race finished"
    );
    Ok(report)
}
