//! Structured logging and run metrics.
//!
//! This module provides:
//! - [`init_logging`] One-time structured logging setup with `RUST_LOG` support
//! - [`Metrics`] Counters and phase timings collected by the benchmark runner

use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Initialize structured logging with `RUST_LOG` environment variable support.
///
/// Defaults to `dagbench=info` when `RUST_LOG` is not set. Logs go to stderr
/// so table and JSON reports on stdout stay clean. Call once at program
/// startup; subsequent calls are silently ignored by `tracing_subscriber`.
pub fn init_logging() {
    init_logging_with_default("dagbench=info");
}

/// Like [`init_logging`] with a caller-chosen fallback directive, e.g.
/// `dagbench=debug` for `--verbose`.
pub fn init_logging_with_default(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Counters and wall-clock phase totals for one benchmark run.
///
/// Serializable to JSON via [`Metrics::to_json`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub graphs_generated: usize,
    pub nodes_generated: usize,
    pub edges_generated: usize,
    pub backends_loaded: usize,
    pub load_failures: usize,
    pub queries_issued: u64,
    pub queries_failed: u64,
    pub inconsistencies: u64,
    pub generation_time: Duration,
    pub load_time: Duration,
    pub warmup_time: Duration,
    pub measure_time: Duration,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "graphs_generated": self.graphs_generated,
            "nodes_generated": self.nodes_generated,
            "edges_generated": self.edges_generated,
            "backends_loaded": self.backends_loaded,
            "load_failures": self.load_failures,
            "queries_issued": self.queries_issued,
            "queries_failed": self.queries_failed,
            "inconsistencies": self.inconsistencies,
            "failure_rate": self.failure_rate(),
            "generation_ms": millis(self.generation_time),
            "load_ms": millis(self.load_time),
            "warmup_ms": millis(self.warmup_time),
            "measure_ms": millis(self.measure_time),
        })
    }

    /// Share of issued queries that returned an error.
    pub fn failure_rate(&self) -> f64 {
        if self.queries_issued == 0 {
            return 0.0;
        }
        self.queries_failed as f64 / self.queries_issued as f64
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
