//! # Stress Aggregator Library
//!
//! The result-aggregation and reporting engine of a load-testing tool. Many
//! concurrent workers each emit one outcome record per completed request;
//! this library consumes that stream, keeps running aggregates, prints
//! periodic progress rows and produces a final report with tail-latency
//! percentiles once the stream closes.
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `outcome`: The record each worker emits per request
//! - `metrics`: Running aggregate, snapshots and derived rates
//! - `percentile`: Latency sample retention and nearest-rank percentiles
//! - `reporter`: Timer-driven progress output running next to the consumer
//! - `render`: Pure console and HTML formatting
//! - `results`: Final report and the output sink
//! - `aggregator`: The single-consumer loop that ties everything together
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use stress_aggregator::{Aggregator, AggregatorConfig, OutcomeRecord, ReportSink};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let concurrency = 4;
//!     let (tx, rx) = tokio::sync::mpsc::channel(1024);
//!
//!     for worker in 0..concurrency {
//!         let tx = tx.clone();
//!         tokio::spawn(async move {
//!             for _ in 0..100 {
//!                 let record = OutcomeRecord::success(worker, Duration::from_millis(12));
//!                 let _ = tx.send(record).await;
//!             }
//!         });
//!     }
//!     drop(tx);
//!
//!     let aggregator = Aggregator::new(AggregatorConfig::default(), ReportSink::stdout())?;
//!     let report = aggregator.run(concurrency, rx).await?;
//!
//!     println!("p99: {:?}", report.percentiles.p99);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Producers send [`OutcomeRecord`]s into a channel; exactly one
//!   [`Aggregator`] drains it
//! - The running aggregate sits behind a mutex held only for one record
//!   update or one snapshot copy
//! - The [`SnapshotReporter`] is stopped with a signal-and-acknowledge
//!   handshake before the final report is computed

/// Consumption loop, run configuration and record sources
pub mod aggregator;

/// Command-line interface of the demo binary
pub mod cli;

/// Error type returned by aggregation runs
///
/// Runs fail only on invalid configuration, a failed record stream or a
/// console that cannot take the final summary; the latter two still carry
/// the computed report.
pub mod error;

/// Tracing subscriber setup and log formatting
pub mod logging;

/// Running aggregate state and derived metrics
///
/// Tracks counters, latency extrema, the error-code histogram, distinct
/// workers and received bytes, and derives qps, averages and byte rates from
/// point-in-time snapshots.
pub mod metrics;

/// Per-request outcome records
///
/// The unit of data workers send to the aggregator: latency, success flag,
/// informational error code and an optional received-byte count.
pub mod outcome;

/// Latency sample buffer and percentile extraction
pub mod percentile;

/// Console table and HTML fragment formatting
pub mod render;

/// Periodic progress reporter
pub mod reporter;

/// Final report and output sink
///
/// Collects console output and the HTML fragment for a run, and writes the
/// final report as JSON for later analysis.
pub mod results;

/// Formatting helpers and run identifiers
///
/// Thousands grouping for byte columns, nanosecond to millisecond
/// conversion, compact durations for log lines and UUID run ids.
pub mod utils;

pub use aggregator::{Aggregator, AggregatorConfig, RecordSource};
pub use error::AggregatorError;
pub use metrics::{AggregateSnapshot, RunningAggregate, SnapshotMetrics};
pub use outcome::OutcomeRecord;
pub use percentile::{percentile, LatencyPercentiles, LatencySamples, PercentileMode};
pub use reporter::SnapshotReporter;
pub use results::{FinalReport, ReportSink};

/// The current version of the stress aggregator
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Time between two progress rows
    pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    /// Capacity of the bounded record channel used by the demo binary
    ///
    /// Large enough that workers rarely wait on the consumer, small enough
    /// to bound memory if the consumer falls behind.
    pub const CHANNEL_CAPACITY: usize = 1000;

    /// Precision of the bounded-memory latency histogram
    pub const HISTOGRAM_SIGNIFICANT_FIGURES: u8 = 3;

    pub const CONCURRENCY: u64 = 10;

    pub const REQUESTS_PER_WORKER: u64 = 100;
}
