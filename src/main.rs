//! Command-line driver for the synchronization harness.
//!
//! Run with:
//! ```bash
//! # Reference scenario: 50 workers x 1000 puts on the snapshot map
//! cargo run --release -- map
//!
//! # All three strategies, median of 5 runs each
//! cargo run --release --features mimalloc -- compare --runs 5
//!
//! # Atomic vs racy counter, 500 workers x 1000 increments
//! cargo run --release -- counter
//!
//! # Worker lifecycle and promotions on stderr
//! RUST_LOG=syncmap_bench=debug cargo run --features tracing -- overlap --strategy mutex
//! ```
//!
//! Exits with status 1 when a run violates the post-barrier invariant or the
//! configuration is invalid.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use syncmap_bench::config::{
    DEFAULT_ITERATIONS, DEFAULT_WORKERS, ITERATIONS_ENV, STRATEGY_ENV, WORKERS_ENV,
};
use syncmap_bench::report::as_millis_f64;
use syncmap_bench::{HarnessConfig, HarnessError, Report, Strategy, harness};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "syncmap-bench", version)]
#[command(about = "Compare map synchronization strategies under concurrent writers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one strategy and verify the result
    Map {
        #[command(flatten)]
        shape: Shape,

        /// Strategy: snapshot, mutex or rwlock
        #[arg(short, long, env = STRATEGY_ENV, default_value = "snapshot")]
        strategy: Strategy,

        /// Print this many entries after the run
        #[arg(long, default_value_t = 5)]
        sample: usize,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every strategy and report the median elapsed time of each
    Compare {
        #[command(flatten)]
        shape: Shape,

        /// Runs per strategy
        #[arg(short, long, default_value_t = 5)]
        runs: usize,

        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe the map with traversals while the writers are running
    Overlap {
        #[command(flatten)]
        shape: Shape,

        /// Strategy: snapshot, mutex or rwlock
        #[arg(short, long, env = STRATEGY_ENV, default_value = "snapshot")]
        strategy: Strategy,

        /// Maximum traversals issued during the write phase
        #[arg(short, long, default_value_t = 100)]
        probes: usize,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Race an atomic counter against a read-then-write counter
    Counter {
        /// Worker threads
        #[arg(short, long, default_value_t = 500)]
        workers: usize,

        /// Increments per worker
        #[arg(short, long, default_value_t = 1000)]
        iterations: usize,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Worker layout shared by the map subcommands.
#[derive(Args, Clone, Copy)]
struct Shape {
    /// Writer threads
    #[arg(short, long, env = WORKERS_ENV, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Puts per writer
    #[arg(short, long, env = ITERATIONS_ENV, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
}

impl Shape {
    fn config(self, strategy: Strategy) -> Result<HarnessConfig, HarnessError> {
        Ok(HarnessConfig::new(strategy, self.workers, self.iterations)?)
    }
}

// =============================================================================
// Subcommands
// =============================================================================

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to encode JSON: {err}"),
    }
}

fn run_map(shape: Shape, strategy: Strategy, sample: usize, json: bool) -> Result<(), HarnessError> {
    let config = shape.config(strategy)?;
    let map = strategy.build_with_capacity::<u64, u64>(config.expected_entries());
    let report = harness::run_with_map(&map, &config)?;

    if json {
        print_json(&report);
        return Ok(());
    }

    println!("{report}");
    println!("throughput: {:.0} puts/sec", report.throughput());
    let entries = harness::sample_entries(map.as_ref(), sample);
    if !entries.is_empty() {
        println!("First {} entries:", entries.len());
        for (key, value) in entries {
            println!("  {key} -> {value}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CompareRow {
    strategy: Strategy,
    runs: usize,
    count: usize,
    #[serde(serialize_with = "as_millis_f64")]
    median: Duration,
    #[serde(serialize_with = "as_millis_f64")]
    fastest: Duration,
    #[serde(serialize_with = "as_millis_f64")]
    slowest: Duration,
}

fn run_compare(shape: Shape, runs: usize, json: bool) -> Result<(), HarnessError> {
    let runs = runs.max(1);
    let mut rows: Vec<CompareRow> = Vec::with_capacity(Strategy::ALL.len());

    for strategy in Strategy::ALL {
        let config = shape.config(strategy)?;
        let mut reports: Vec<Report> = Vec::with_capacity(runs);
        for _ in 0..runs {
            reports.push(harness::run(&config)?);
        }
        reports.sort_by_key(|r| r.elapsed);

        rows.push(CompareRow {
            strategy,
            runs,
            count: reports[0].count,
            median: reports[runs / 2].elapsed,
            fastest: reports[0].elapsed,
            slowest: reports[runs - 1].elapsed,
        });
    }

    if json {
        print_json(&rows);
        return Ok(());
    }

    println!(
        "{} workers x {} puts, {runs} runs per strategy",
        shape.workers, shape.iterations
    );
    println!(
        "{:<10} {:>10} {:>12} {:>12} {:>12}",
        "strategy", "count", "median", "fastest", "slowest"
    );
    for row in &rows {
        println!(
            "{:<10} {:>10} {:>12.2?} {:>12.2?} {:>12.2?}",
            row.strategy.name(),
            row.count,
            row.median,
            row.fastest,
            row.slowest
        );
    }
    Ok(())
}

fn run_overlap(shape: Shape, strategy: Strategy, probes: usize, json: bool) -> Result<(), HarnessError> {
    let config = shape.config(strategy)?;
    let report = harness::run_overlapping(&config, probes)?;
    if json {
        print_json(&report);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn run_counter(workers: usize, iterations: usize, json: bool) -> Result<(), HarnessError> {
    let report = harness::run_counter_race(workers, iterations)?;
    if json {
        print_json(&report);
    } else {
        println!("{report}");
    }
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    syncmap_bench::init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Map {
            shape,
            strategy,
            sample,
            json,
        } => run_map(shape, strategy, sample, json),
        Command::Compare { shape, runs, json } => run_compare(shape, runs, json),
        Command::Overlap {
            shape,
            strategy,
            probes,
            json,
        } => run_overlap(shape, strategy, probes, json),
        Command::Counter {
            workers,
            iterations,
            json,
        } => run_counter(workers, iterations, json),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
