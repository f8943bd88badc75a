//! # Stress Aggregator - Main Entry Point
//!
//! Drives the aggregation engine with simulated workers so the progress
//! table, the final summary and the report files can be exercised without a
//! real transport.
//!
//! ## Flow
//!
//! 1. **Initialize logging**: tracing subscriber on stderr
//! 2. **Parse arguments**: clap derive parser
//! 3. **Spawn workers**: `concurrency` tasks each sending `requests` records
//! 4. **Aggregate**: drain the channel, printing progress every interval
//! 5. **Write reports**: optional HTML fragment and JSON report
//!
//! Ctrl-C stops aggregation early; the partial results are still printed.

use anyhow::{bail, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use stress_aggregator::{
    cli::Args, logging, utils::format_duration, Aggregator, AggregatorConfig, AggregatorError,
    OutcomeRecord, ReportSink,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SUCCESS_CODE: i32 = 200;
const FAILURE_CODE: i32 = 500;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    if !(0.0..=1.0).contains(&args.failure_rate) {
        bail!("failure rate must be between 0.0 and 1.0, got {}", args.failure_rate);
    }

    info!("Starting Stress Aggregator {}", stress_aggregator::VERSION);
    debug!("Configuration: {:?}", args);

    let config = AggregatorConfig::from(&args);
    let mut sink = ReportSink::stdout();
    if args.html_output.is_none() {
        sink = sink.without_html();
    }
    let aggregator = Aggregator::new(config, sink)?;

    let (tx, rx) = mpsc::channel(stress_aggregator::defaults::CHANNEL_CAPACITY);
    let workers: Vec<JoinHandle<()>> = (0..args.concurrency)
        .map(|worker_id| tokio::spawn(simulate_worker(worker_id, args.clone(), tx.clone())))
        .collect();
    // The channel closes once every worker has dropped its sender
    drop(tx);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let report = match aggregator.run_until(args.concurrency, rx, shutdown).await {
        Ok(report) => report,
        // Console gone; the report files are still worth writing
        Err(AggregatorError::Output { source, report }) => {
            warn!("Final summary could not be printed: {}", source);
            *report
        }
        Err(e) => return Err(e.into()),
    };

    for worker in workers {
        worker.abort();
    }

    if let Some(ref path) = args.html_output {
        aggregator.sink().lock().write_html(path)?;
    }
    if let Some(ref path) = args.json_output {
        ReportSink::write_json(path, &report)?;
    }

    info!(
        "Run {} finished in {}",
        report.run_id,
        format_duration(report.request_time)
    );
    Ok(())
}

/// Perform `args.requests` simulated requests and report each outcome
async fn simulate_worker(worker_id: u64, args: Args, tx: mpsc::Sender<OutcomeRecord>) {
    let mut rng = StdRng::from_entropy();
    let mean_ns = args.mean_latency.as_nanos() as f64;

    for _ in 0..args.requests {
        // Uniform in [0.5, 1.5) of the mean
        let latency = Duration::from_nanos((mean_ns * rng.gen_range(0.5..1.5)) as u64);
        let started = tokio::time::Instant::now();
        tokio::time::sleep(latency).await;
        let elapsed = started.elapsed();

        let record = if rng.gen_bool(args.failure_rate) {
            OutcomeRecord::failure(worker_id, elapsed, FAILURE_CODE)
        } else {
            OutcomeRecord::success(worker_id, elapsed)
                .with_error_code(SUCCESS_CODE)
                .with_received_bytes(rng.gen_range(512..4096))
        };

        if tx.send(record).await.is_err() {
            debug!("Worker {} stopping, aggregator is gone", worker_id);
            return;
        }
    }
}
