//! Run reports.
//!
//! Reports are plain values: the harness fills them in, drivers print them
//! (`Display`) or emit them as JSON (`Serialize`). Nothing here aggregates
//! across runs.

use std::fmt as StdFmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::strategy::{LenConsistency, Strategy};

/// Serialize a [`Duration`] as fractional milliseconds, for
/// `#[serde(serialize_with = ...)]`.
///
/// # Errors
///
/// Whatever `serializer` reports.
pub fn as_millis_f64<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

// ============================================================================
//  Report
// ============================================================================

/// Outcome of a write phase followed by the read pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Strategy under test.
    pub strategy: Strategy,
    /// Worker count `W`.
    pub workers: usize,
    /// Iterations per worker `I`.
    pub iterations: usize,
    /// `W * I`.
    pub expected: usize,
    /// Value of `len()` after the barrier.
    pub count: usize,
    /// Entries visited by `for_each` after the barrier.
    pub visited: usize,
    /// Guarantee behind `count`.
    pub len_consistency: LenConsistency,
    /// Wall-clock time from the first spawn to the barrier release.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis_f64")]
    pub elapsed: Duration,
}

impl Report {
    /// `count - expected`. Zero for a correct strategy.
    #[must_use]
    #[expect(clippy::cast_possible_wrap)]
    pub const fn discrepancy(&self) -> i64 {
        self.count as i64 - self.expected as i64
    }

    /// Whether `len`, `for_each` and the expected count all agree.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.count == self.expected && self.visited == self.expected
    }

    /// Writes per second over the write phase.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.expected as f64 / secs
        } else {
            0.0
        }
    }
}

impl StdFmt::Display for Report {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "strategy={} workers={} iterations={} count={} expected={} discrepancy={} elapsed={:?}",
            self.strategy,
            self.workers,
            self.iterations,
            self.count,
            self.expected,
            self.discrepancy(),
            self.elapsed
        )
    }
}

// ============================================================================
//  OverlapReport
// ============================================================================

/// Outcome of a run whose reads overlapped the write phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapReport {
    /// Strategy under test.
    pub strategy: Strategy,
    /// `W * I`.
    pub expected: usize,
    /// `for_each` counts observed while writers were still running, in order.
    pub observed: Vec<usize>,
    /// `len()` after the barrier.
    pub final_count: usize,
    /// Wall-clock time from the first spawn to the barrier release.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis_f64")]
    pub elapsed: Duration,
}

impl OverlapReport {
    /// Whether every mid-run observation lies in `0..=expected`.
    #[must_use]
    pub fn observations_bounded(&self) -> bool {
        self.observed.iter().all(|&c| c <= self.expected)
    }
}

impl StdFmt::Display for OverlapReport {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let min = self.observed.iter().min().copied().unwrap_or(0);
        let max = self.observed.iter().max().copied().unwrap_or(0);
        write!(
            f,
            "strategy={} probes={} observed=[{min}..={max}] final={} expected={} elapsed={:?}",
            self.strategy,
            self.observed.len(),
            self.final_count,
            self.expected,
            self.elapsed
        )
    }
}

// ============================================================================
//  CounterReport
// ============================================================================

/// Final values of the atomic and racy counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterReport {
    /// Worker count `W`.
    pub workers: usize,
    /// Increments per worker `I`.
    pub iterations: usize,
    /// `W * I`.
    pub expected: u64,
    /// Final value of the fetch-and-add counter.
    pub atomic: u64,
    /// Final value of the read-then-write counter.
    pub racy: u64,
    /// Wall-clock time from the first spawn to the barrier release.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis_f64")]
    pub elapsed: Duration,
}

impl CounterReport {
    /// Increments lost by the atomic counter. Zero unless the platform is broken.
    #[must_use]
    pub const fn atomic_lost(&self) -> u64 {
        self.expected.saturating_sub(self.atomic)
    }

    /// Increments lost by the racy counter.
    #[must_use]
    pub const fn racy_lost(&self) -> u64 {
        self.expected.saturating_sub(self.racy)
    }

    /// `lost` as a percentage of `expected`.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn lost_percent(&self, lost: u64) -> f64 {
        if self.expected == 0 {
            0.0
        } else {
            lost as f64 / self.expected as f64 * 100.0
        }
    }
}

impl StdFmt::Display for CounterReport {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        writeln!(
            f,
            "Expected value: {} ({} workers x {} increments)",
            self.expected, self.workers, self.iterations
        )?;
        writeln!(f, "Atomic ops:     {}", self.atomic)?;
        writeln!(f, "Non-atomic ops: {}", self.racy)?;
        writeln!(f)?;
        writeln!(f, "Increments lost:")?;
        writeln!(
            f,
            "  Atomic:     {} ({:.2}%)",
            self.atomic_lost(),
            self.lost_percent(self.atomic_lost())
        )?;
        write!(
            f,
            "  Non-atomic: {} ({:.2}%)",
            self.racy_lost(),
            self.lost_percent(self.racy_lost())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(count: usize, visited: usize) -> Report {
        Report {
            strategy: Strategy::Mutex,
            workers: 50,
            iterations: 1000,
            expected: 50_000,
            count,
            visited,
            len_consistency: LenConsistency::Exact,
            elapsed: Duration::from_millis(8),
        }
    }

    #[test]
    fn discrepancy_is_signed() {
        assert_eq!(report(50_000, 50_000).discrepancy(), 0);
        assert_eq!(report(49_990, 49_990).discrepancy(), -10);
        assert!(report(50_000, 50_000).is_consistent());
        assert!(!report(50_000, 49_999).is_consistent());
    }

    #[test]
    fn display_names_count_elapsed_and_strategy() {
        let line = report(50_000, 50_000).to_string();
        assert!(line.contains("strategy=mutex"));
        assert!(line.contains("count=50000"));
        assert!(line.contains("elapsed=8ms"));
    }

    #[test]
    fn throughput_is_writes_per_second() {
        // 50k writes in 8ms.
        assert!((report(50_000, 50_000).throughput() - 6_250_000.0).abs() < 1e-3);

        let instant = Report {
            elapsed: Duration::ZERO,
            ..report(50_000, 50_000)
        };
        assert!(instant.throughput().abs() < f64::EPSILON);
    }

    #[test]
    fn json_uses_milliseconds() {
        let json = serde_json::to_value(report(50_000, 50_000)).unwrap();
        assert_eq!(json["strategy"], "mutex");
        assert_eq!(json["count"], 50_000);
        assert_eq!(json["len_consistency"], "exact");
        assert!((json["elapsed_ms"].as_f64().unwrap() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn counter_losses() {
        let report = CounterReport {
            workers: 500,
            iterations: 1000,
            expected: 500_000,
            atomic: 500_000,
            racy: 375_000,
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.atomic_lost(), 0);
        assert_eq!(report.racy_lost(), 125_000);
        assert!((report.lost_percent(report.racy_lost()) - 25.0).abs() < 1e-9);
        assert!(report.lost_percent(0).abs() < 1e-9);
        assert!(report.to_string().contains("Non-atomic: 125000 (25.00%)"));
    }

    #[test]
    fn overlap_bounds() {
        let report = OverlapReport {
            strategy: Strategy::Snapshot,
            expected: 100,
            observed: vec![0, 40, 100],
            final_count: 100,
            elapsed: Duration::ZERO,
        };
        assert!(report.observations_bounded());
        assert!(report.to_string().contains("observed=[0..=100]"));
    }
}
