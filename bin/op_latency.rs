//! Per-operation latency profiling for each map strategy.
//!
//! Times every `put` of the writer workload and reports the longest one and
//! how many crossed the 10us, 1ms and 10ms marks. Each strategy is run
//! several times; the slowest run is printed against the median so lock
//! convoys and promotion stalls stand out.
//!
//! Run with:
//! ```bash
//! # Stats only
//! cargo run --release --features mimalloc --bin op_latency
//!
//! # With JSON tracing (writes to logs/op_latency.json)
//! RUST_LOG=syncmap_bench=debug,op_latency=warn cargo run --release --features "mimalloc,tracing" --bin op_latency -- --strategy snapshot
//!
//! # View slow operations:
//! rg "SLOW_OP" logs/op_latency.json
//! ```

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use syncmap_bench::config::STRATEGY_ENV;
use syncmap_bench::key::{entry_key, entry_value};
use syncmap_bench::{ConcurrentMap, HarnessConfig, HarnessError, Strategy, harness};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "tracing")]
type TracingGuard = tracing_appender::non_blocking::WorkerGuard;

#[cfg(not(feature = "tracing"))]
type TracingGuard = ();

/// Operations slower than this are logged individually.
const SLOW_OP_NS: u64 = 10_000_000;

// =============================================================================
// Tracing Initialization (JSON to file)
// =============================================================================

#[cfg(feature = "tracing")]
fn init_json_tracing() -> TracingGuard {
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = "logs";
    let filter_str = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "syncmap_bench=warn,op_latency=warn".to_string());

    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::never(log_dir, "op_latency.json");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_filter(EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("warn")));

    let _ = tracing_subscriber::registry().with(file_layer).try_init();

    println!("Tracing enabled: logs/op_latency.json (filter: {filter_str})");

    guard
}

#[cfg(not(feature = "tracing"))]
fn init_json_tracing() -> TracingGuard {
    println!("Tracing disabled (compile with --features tracing)");
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "op_latency")]
#[command(about = "Per-put latency of each map strategy under concurrent writers")]
struct Cli {
    /// Profile only this strategy (default: `SYNCBENCH_STRATEGY`, else all)
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// Writer threads (default: `SYNCBENCH_WORKERS`, else 50)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Puts per writer (default: `SYNCBENCH_ITERATIONS`, else 1000)
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Runs per strategy
    #[arg(short, long, default_value_t = 10)]
    runs: usize,
}

// =============================================================================
// Operation Stats (Thread-Local + Aggregation)
// =============================================================================

/// Per-thread `put` timing statistics.
#[derive(Default, Clone, Copy)]
struct ThreadOpStats {
    max_op_ns: u64,
    total_ns: u64,
    ops: u64,
    /// Ops slower than 10us.
    slow_ops_10us: u64,
    /// Ops slower than 1ms.
    slow_ops_1ms: u64,
    /// Ops slower than 10ms.
    slow_ops_10ms: u64,
}

impl ThreadOpStats {
    const fn record_op(&mut self, op_ns: u64) {
        if op_ns > self.max_op_ns {
            self.max_op_ns = op_ns;
        }
        self.total_ns += op_ns;
        self.ops += 1;

        if op_ns > 10_000 {
            self.slow_ops_10us += 1;
        }
        if op_ns > 1_000_000 {
            self.slow_ops_1ms += 1;
        }
        if op_ns > 10_000_000 {
            self.slow_ops_10ms += 1;
        }
    }

    const fn merge(&mut self, other: &Self) {
        if other.max_op_ns > self.max_op_ns {
            self.max_op_ns = other.max_op_ns;
        }
        self.total_ns += other.total_ns;
        self.ops += other.ops;
        self.slow_ops_10us += other.slow_ops_10us;
        self.slow_ops_1ms += other.slow_ops_1ms;
        self.slow_ops_10ms += other.slow_ops_10ms;
    }

    fn mean_ns(&self) -> f64 {
        if self.ops == 0 {
            0.0
        } else {
            self.total_ns as f64 / self.ops as f64
        }
    }
}

// =============================================================================
// Runner
// =============================================================================

struct RunResult {
    elapsed: Duration,
    stats: ThreadOpStats,
}

fn run_once(config: &HarnessConfig) -> Result<RunResult, HarnessError> {
    let map: Arc<dyn ConcurrentMap<u64, u64>> = config
        .strategy()
        .build_with_capacity(config.expected_entries());
    let iterations = config.iterations();

    let start = Instant::now();
    let handles = harness::spawn_workers(config.workers(), "writer", |worker| {
        let map = Arc::clone(&map);
        move || {
            let mut stats = ThreadOpStats::default();
            for iteration in 0..iterations {
                let key = entry_key(worker, iteration, iterations);

                let op_start = Instant::now();
                map.put(key, entry_value(iteration));
                let op_ns = op_start.elapsed().as_nanos() as u64;
                stats.record_op(op_ns);

                if op_ns > SLOW_OP_NS {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        worker,
                        iteration,
                        key,
                        elapsed_ms = op_ns as f64 / 1_000_000.0,
                        "SLOW_OP"
                    );

                    #[cfg(not(feature = "tracing"))]
                    eprintln!(
                        "[W{worker:02}] SLOW_OP: i={iteration} key={key} took {:.2}ms",
                        op_ns as f64 / 1_000_000.0
                    );
                }
            }
            stats
        }
    })?;

    let mut merged = ThreadOpStats::default();
    for stats in harness::join_workers(handles)? {
        merged.merge(&stats);
    }
    let elapsed = start.elapsed();

    harness::verify(map.as_ref(), config)?;
    Ok(RunResult {
        elapsed,
        stats: merged,
    })
}

fn print_stats(config: &HarnessConfig, result: &RunResult, baseline: Duration) {
    let stats = &result.stats;
    let total = config.expected_entries();

    println!("\n{}", "=".repeat(72));
    println!(
        "{}: {} workers x {} puts = {total}",
        config.strategy(),
        config.workers(),
        config.iterations()
    );
    println!("{}", "=".repeat(72));

    println!("Elapsed:     {:?}", result.elapsed);
    if result.elapsed > Duration::ZERO {
        println!(
            "Throughput:  {:.0} puts/sec",
            total as f64 / result.elapsed.as_secs_f64()
        );
    }
    println!("Mean put:    {:.0} ns", stats.mean_ns());
    println!("Max put:     {:.3} ms", stats.max_op_ns as f64 / 1_000_000.0);
    println!("Slow >10us:  {}", stats.slow_ops_10us);
    println!("Slow >1ms:   {}", stats.slow_ops_1ms);
    println!("Slow >10ms:  {}", stats.slow_ops_10ms);

    let baseline_s = baseline.as_secs_f64();
    if baseline_s > 0.0 && result.elapsed.as_secs_f64() > baseline_s * 3.0 {
        let ratio = result.elapsed.as_secs_f64() / baseline_s;
        println!("\n!!! OUTLIER: ~{ratio:.1}x slower than the median run");
    }
}

fn median(results: &[RunResult]) -> Duration {
    let mut sorted: Vec<Duration> = results.iter().map(|r| r.elapsed).collect();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => Duration::ZERO,
        n if n % 2 == 1 => sorted[mid],
        _ => Duration::from_secs_f64(f64::midpoint(
            sorted[mid - 1].as_secs_f64(),
            sorted[mid].as_secs_f64(),
        )),
    }
}

fn profile(config: &HarnessConfig, runs: usize) -> Result<(), HarnessError> {
    println!(
        "\nRunning {}: {} workers x {} puts...",
        config.strategy(),
        config.workers(),
        config.iterations()
    );

    let mut results: Vec<RunResult> = Vec::with_capacity(runs);
    for run in 1..=runs {
        let result = run_once(config)?;
        println!("  Run {run}/{runs}: {:?}", result.elapsed);
        results.push(result);
    }

    let baseline = median(&results);
    let slowest = results.iter().enumerate().max_by_key(|(_, r)| r.elapsed);
    let fastest = results.iter().enumerate().min_by_key(|(_, r)| r.elapsed);

    if let (Some((slow_idx, slow)), Some((fast_idx, fast))) = (slowest, fastest) {
        println!("\n>>> Slowest run was #{} <<<", slow_idx + 1);
        println!("Median run: {baseline:?}");
        print_stats(config, slow, baseline);

        if fast.elapsed > Duration::ZERO {
            println!(
                "\nFastest run #{}: {:?} (ratio: {:.1}x)",
                fast_idx + 1,
                fast.elapsed,
                slow.elapsed.as_secs_f64() / fast.elapsed.as_secs_f64()
            );
        }
    }
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    let _guard = init_json_tracing();
    let cli = Cli::parse();

    println!("Put Latency Profiling");
    println!("=====================");

    let shape = match HarnessConfig::from_env() {
        Ok(shape) => shape,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let workers = cli.workers.unwrap_or_else(|| shape.workers());
    let iterations = cli.iterations.unwrap_or_else(|| shape.iterations());

    let only = cli
        .strategy
        .or_else(|| std::env::var(STRATEGY_ENV).is_ok().then_some(shape.strategy()));
    let strategies: Vec<Strategy> = only.map_or_else(|| Strategy::ALL.to_vec(), |s| vec![s]);
    for strategy in strategies {
        let outcome = HarnessConfig::new(strategy, workers, iterations)
            .map_err(HarnessError::from)
            .and_then(|config| profile(&config, cli.runs.max(1)));

        if let Err(err) = outcome {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
