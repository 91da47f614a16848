//! Helpers shared by the integration tests: log capture and run shapes.
//!
//! With the `tracing` feature, harness events go to libtest's captured
//! output and to `logs/syncbench-tests.jsonl`, one JSON object per line.
//! Filter with `RUST_LOG`; the default keeps only `syncmap_bench=info`.
//!
//! ```bash
//! # Order in which writers finished
//! RUST_LOG=syncmap_bench=trace cargo test --features tracing --test harness_tests
//! jq 'select(.fields.message == "writer finished") | .threadName' logs/syncbench-tests.jsonl
//! ```
//!
//! `SYNCBENCH_LOG_DIR` moves the log file.

#![allow(dead_code)]

use std::env;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use syncmap_bench::{HarnessConfig, Strategy};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Worker counts of the shape grid.
pub const GRID_WORKERS: [usize; 3] = [1, 10, 50];

/// Iterations per worker of the shape grid.
pub const GRID_ITERATIONS: [usize; 3] = [1, 100, 1000];

const DEFAULT_FILTER: &str = "syncmap_bench=info";

static INIT: Once = Once::new();

/// Install the test subscriber once per process.
pub fn init_tracing() {
    INIT.call_once(|| {
        let file_layer = open_log_file().map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_thread_names(true)
                .with_target(true)
                .json()
                .with_filter(filter())
        });

        let capture_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_thread_names(true)
            .compact()
            .with_filter(filter());

        let _ = Registry::default()
            .with(file_layer)
            .with(capture_layer)
            .try_init();
    });
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Append mode: nextest runs each test in its own process.
fn open_log_file() -> Option<File> {
    let dir = env::var("SYNCBENCH_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from);
    std::fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("syncbench-tests.jsonl"))
        .ok()
}

/// Build a run configuration known to be valid.
#[expect(clippy::expect_used)]
pub fn config(strategy: Strategy, workers: usize, iterations: usize) -> HarnessConfig {
    HarnessConfig::new(strategy, workers, iterations).expect("valid run shape")
}

/// Every `(W, I)` pair of the shape grid.
pub fn grid() -> impl Iterator<Item = (usize, usize)> {
    GRID_WORKERS
        .into_iter()
        .flat_map(|w| GRID_ITERATIONS.into_iter().map(move |i| (w, i)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_nine_shapes() {
        let shapes: Vec<_> = grid().collect();
        assert_eq!(shapes.len(), 9);
        assert_eq!(shapes.first(), Some(&(1, 1)));
        assert_eq!(shapes.last(), Some(&(50, 1000)));
    }

    #[test]
    fn tracing_init_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!(target: "syncmap_bench", workers = 4, "tracing ready");
    }
}
