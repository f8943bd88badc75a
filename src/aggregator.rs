use crate::error::AggregatorError;
use crate::metrics::{RunningAggregate, SnapshotMetrics};
use crate::outcome::OutcomeRecord;
use crate::percentile::{LatencySamples, PercentileMode};
use crate::reporter::SnapshotReporter;
use crate::results::{FinalReport, ReportSink};
use crate::utils::generate_run_id;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for an aggregation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorConfig {
    /// Time between progress rows
    pub report_interval: Duration,
    /// How latency samples are retained for percentile extraction
    pub percentile_mode: PercentileMode,
    /// Requests each worker was asked to perform, if known up front
    pub requests_per_worker: Option<u64>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            report_interval: crate::defaults::REPORT_INTERVAL,
            percentile_mode: PercentileMode::Exact,
            requests_per_worker: None,
        }
    }
}

impl AggregatorConfig {
    /// Reject configurations the reporter or the sample buffer cannot use
    pub fn validate(&self) -> Result<(), AggregatorError> {
        if self.report_interval.is_zero() {
            return Err(AggregatorError::InvalidConfig(
                "report interval must be greater than zero".to_string(),
            ));
        }
        if Instant::now().checked_add(self.report_interval).is_none() {
            return Err(AggregatorError::InvalidConfig(format!(
                "report interval {:?} is too large",
                self.report_interval
            )));
        }

        if let PercentileMode::Histogram {
            significant_figures,
        } = self.percentile_mode
        {
            if !(1..=5).contains(&significant_figures) {
                return Err(AggregatorError::InvalidConfig(format!(
                    "histogram precision must be between 1 and 5 significant figures, got {}",
                    significant_figures
                )));
            }
        }

        Ok(())
    }
}

/// A stream of outcome records with a single consumer
///
/// `Ok(None)` means every producer has finished and the stream is closed.
/// An `Err` ends the run early; implementations must be cancel safe since
/// the aggregator may drop a pending `next_record` future on shutdown.
#[async_trait]
pub trait RecordSource: Send {
    async fn next_record(&mut self) -> anyhow::Result<Option<OutcomeRecord>>;
}

#[async_trait]
impl RecordSource for mpsc::Receiver<OutcomeRecord> {
    async fn next_record(&mut self) -> anyhow::Result<Option<OutcomeRecord>> {
        Ok(self.recv().await)
    }
}

#[async_trait]
impl RecordSource for mpsc::UnboundedReceiver<OutcomeRecord> {
    async fn next_record(&mut self) -> anyhow::Result<Option<OutcomeRecord>> {
        Ok(self.recv().await)
    }
}

/// How the consumption loop ended
enum Termination {
    Drained,
    Interrupted,
    Failed(anyhow::Error),
}

/// Warns the first time more distinct workers show up than configured
struct ConcurrencyWatch {
    configured: u64,
    warned: bool,
}

impl ConcurrencyWatch {
    fn new(configured: u64) -> Self {
        Self {
            configured,
            warned: false,
        }
    }

    /// Returns true when this observation produced the warning
    fn observe(&mut self, observed: usize) -> bool {
        if self.warned || observed as u64 <= self.configured {
            return false;
        }

        warn!(
            "Observed {} distinct workers, more than the configured concurrency of {}",
            observed, self.configured
        );
        self.warned = true;
        true
    }
}

/// Single consumer of a load test's outcome stream
///
/// Owns the running aggregate and the latency samples for the duration of a
/// run, drives the snapshot reporter and produces the [`FinalReport`].
#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    sink: Arc<Mutex<ReportSink>>,
}

impl Aggregator {
    /// Create an aggregator that prints to `sink`
    pub fn new(config: AggregatorConfig, sink: ReportSink) -> Result<Self, AggregatorError> {
        config.validate()?;

        Ok(Self {
            config,
            sink: Arc::new(Mutex::new(sink)),
        })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Shared handle to the output sink, e.g. to read the HTML fragment
    /// after the run
    pub fn sink(&self) -> Arc<Mutex<ReportSink>> {
        Arc::clone(&self.sink)
    }

    /// Consume `source` until it closes and return the final report
    pub async fn run<S>(&self, concurrency: u64, source: S) -> Result<FinalReport, AggregatorError>
    where
        S: RecordSource,
    {
        self.run_until(concurrency, source, std::future::pending::<()>())
            .await
    }

    /// Like [`run`](Self::run), but stop consuming as soon as `shutdown`
    /// resolves
    ///
    /// An interrupted run still prints and returns the aggregate gathered so
    /// far, marked as not completed.
    pub async fn run_until<S, F>(
        &self,
        concurrency: u64,
        mut source: S,
        shutdown: F,
    ) -> Result<FinalReport, AggregatorError>
    where
        S: RecordSource,
        F: Future<Output = ()>,
    {
        let aggregate = Arc::new(Mutex::new(RunningAggregate::new()));
        let mut samples = LatencySamples::new(self.config.percentile_mode)?;
        info!(
            "Aggregating results for {} concurrent workers",
            concurrency
        );

        // Console failures never stop consumption
        if let Err(e) = self.sink.lock().write_header() {
            warn!("Failed to write progress header: {}", e);
        }
        let reporter = SnapshotReporter::start(
            Arc::clone(&aggregate),
            concurrency,
            self.config.report_interval,
            Arc::clone(&self.sink),
        );

        tokio::pin!(shutdown);
        let mut watch = ConcurrencyWatch::new(concurrency);
        let termination = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break Termination::Interrupted,
                next = source.next_record() => match next {
                    Ok(Some(record)) => {
                        let observed = {
                            let mut aggregate = aggregate.lock();
                            aggregate.record(&record);
                            aggregate.observed_concurrency()
                        };
                        samples.record(record.latency_ns);
                        watch.observe(observed);
                    }
                    Ok(None) => break Termination::Drained,
                    Err(e) => break Termination::Failed(e),
                },
            }
        };

        // No progress row may interleave with the summary below
        reporter.stop().await;

        let completed = matches!(termination, Termination::Drained);
        let report = self.finalize(concurrency, &aggregate, samples, completed);
        let written = self.write_final(&report);

        match termination {
            Termination::Failed(e) => {
                if let Err(write_err) = written {
                    warn!("Failed to print partial results: {}", write_err);
                }
                Err(AggregatorError::StreamFailed {
                    reason: format!("{:#}", e),
                    partial: Box::new(report),
                })
            }
            Termination::Interrupted => {
                warn!(
                    "Run interrupted after {} records, reporting partial results",
                    report.total_requests
                );
                finish(report, written)
            }
            Termination::Drained => {
                info!(
                    "Aggregation finished: {} records in {:.3}s",
                    report.total_requests,
                    report.request_time.as_secs_f64()
                );
                finish(report, written)
            }
        }
    }

    /// Run on a separate task; awaiting the handle waits for the final
    /// report
    pub fn spawn<S>(
        self,
        concurrency: u64,
        source: S,
    ) -> JoinHandle<Result<FinalReport, AggregatorError>>
    where
        S: RecordSource + 'static,
    {
        tokio::spawn(async move { self.run(concurrency, source).await })
    }

    fn finalize(
        &self,
        concurrency: u64,
        aggregate: &Mutex<RunningAggregate>,
        samples: LatencySamples,
        completed: bool,
    ) -> FinalReport {
        let (snapshot, started_at) = {
            let aggregate = aggregate.lock();
            (aggregate.snapshot(), aggregate.started_at())
        };
        let sample_count = samples.len();
        debug!("Extracting percentiles from {} latency samples", sample_count);
        let percentiles = samples.into_percentiles();

        FinalReport {
            run_id: generate_run_id(),
            started_at,
            concurrency,
            metrics: SnapshotMetrics::compute(&snapshot, concurrency),
            request_time: snapshot.elapsed,
            total_requests: snapshot.total_records(),
            expected_requests: self
                .config
                .requests_per_worker
                .map(|per_worker| per_worker.saturating_mul(concurrency)),
            aggregate: snapshot,
            sample_count,
            percentiles,
            completed,
        }
    }

    /// Final progress row followed by the summary block
    ///
    /// The summary is attempted even if the row failed; the first error wins.
    fn write_final(&self, report: &FinalReport) -> io::Result<()> {
        let mut sink = self.sink.lock();
        let row = sink.write_progress(&report.aggregate, report.concurrency);
        let summary = sink.write_summary(report);
        row.and(summary)
    }
}

fn finish(report: FinalReport, written: io::Result<()>) -> Result<FinalReport, AggregatorError> {
    match written {
        Ok(()) => Ok(report),
        Err(source) => Err(AggregatorError::Output {
            source,
            report: Box::new(report),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn aggregator(config: AggregatorConfig) -> (Aggregator, Captured) {
        let console = Captured::default();
        let sink = ReportSink::new(Box::new(console.clone()));
        (Aggregator::new(config, sink).unwrap(), console)
    }

    #[test]
    fn test_config_validation() {
        assert!(AggregatorConfig::default().validate().is_ok());

        let zero_interval = AggregatorConfig {
            report_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(AggregatorError::InvalidConfig(_))
        ));

        let bad_precision = AggregatorConfig {
            percentile_mode: PercentileMode::Histogram {
                significant_figures: 0,
            },
            ..Default::default()
        };
        assert!(bad_precision.validate().is_err());

        let unrepresentable = AggregatorConfig {
            report_interval: Duration::MAX,
            ..Default::default()
        };
        assert!(matches!(
            unrepresentable.validate(),
            Err(AggregatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_concurrency_watch_warns_once() {
        let mut watch = ConcurrencyWatch::new(2);

        assert!(!watch.observe(1));
        assert!(!watch.observe(2));
        assert!(watch.observe(3));
        assert!(!watch.observe(4));
    }

    #[tokio::test]
    async fn test_console_failure_still_aggregates() {
        let aggregator =
            Aggregator::new(AggregatorConfig::default(), ReportSink::new(Box::new(BrokenPipe)))
                .unwrap();
        let (tx, rx) = mpsc::channel(8);
        for latency in [1, 2, 3] {
            tx.send(OutcomeRecord::success(0, Duration::from_millis(latency)))
                .await
                .unwrap();
        }
        drop(tx);

        let err = aggregator.run(1, rx).await.unwrap_err();
        assert!(matches!(err, AggregatorError::Output { .. }));

        let report = err.report().unwrap();
        assert!(report.completed);
        assert_eq!(report.total_requests, 3);
        assert_eq!(report.percentiles.p99, Some(3_000_000));

        // HTML is collected even though the console is gone
        let sink = aggregator.sink();
        let sink = sink.lock();
        assert!(sink.html_fragment().contains("<h5>Result</h5>"));
    }

    #[tokio::test]
    async fn test_more_sources_than_configured() {
        let (aggregator, _console) = aggregator(AggregatorConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        for source in [0, 1, 2, 1, 0] {
            tx.send(OutcomeRecord::success(source, Duration::from_millis(2)))
                .unwrap();
        }
        drop(tx);

        let report = aggregator.run(2, rx).await.unwrap();
        assert!(report.completed);
        assert_eq!(report.total_requests, 5);
        assert_eq!(report.aggregate.observed_concurrency, 3);
    }

    #[tokio::test]
    async fn test_four_record_scenario() {
        let (aggregator, console) = aggregator(AggregatorConfig::default());
        let (tx, rx) = mpsc::channel(16);

        for (i, latency_ms) in [10u64, 20, 30, 40].into_iter().enumerate() {
            tx.send(OutcomeRecord::success(
                i as u64 % 2,
                Duration::from_millis(latency_ms),
            ))
            .await
            .unwrap();
        }
        drop(tx);

        let report = aggregator.run(2, rx).await.unwrap();
        assert!(report.completed);
        assert_eq!(report.success_count(), 4);
        assert_eq!(report.failure_count(), 0);
        assert_eq!(report.aggregate.error_histogram.get(&0), Some(&4));
        assert_eq!(report.aggregate.error_histogram.len(), 1);
        assert_eq!(report.aggregate.observed_concurrency, 2);
        assert_eq!(report.percentiles.p90, Some(40_000_000));
        assert_eq!(report.sample_count, 4);

        let text = console.text();
        assert!(text.contains("tp90: 40.000"));
        assert!(text.contains("Concurrency: 2"));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let (aggregator, console) = aggregator(AggregatorConfig::default());
        let (tx, rx) = mpsc::unbounded_channel::<OutcomeRecord>();
        drop(tx);

        let report = aggregator.run(3, rx).await.unwrap();
        assert_eq!(report.success_count(), 0);
        assert_eq!(report.failure_count(), 0);
        assert_eq!(report.metrics.qps, 0.0);
        assert_eq!(report.metrics.average_latency_ms, 0.0);
        assert_eq!(report.percentiles.p90, None);
        assert_eq!(report.percentiles.p99, None);
        assert!(console.text().contains("tp99: 0.000"));
    }

    #[tokio::test]
    async fn test_expected_requests_from_config() {
        let config = AggregatorConfig {
            requests_per_worker: Some(5),
            ..Default::default()
        };
        let (aggregator, _console) = aggregator(config);
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let report = aggregator.run(4, rx).await.unwrap();
        assert_eq!(report.expected_requests, Some(20));
    }

    #[tokio::test]
    async fn test_shutdown_reports_partial_results() {
        let (aggregator, console) = aggregator(AggregatorConfig::default());
        let (tx, rx) = mpsc::channel(8);
        tx.send(OutcomeRecord::success(0, Duration::from_millis(3)))
            .await
            .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            aggregator
                .run_until(1, rx, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        tokio::task::yield_now().await;
        stop_tx.send(()).unwrap();
        let report = run.await.unwrap().unwrap();

        // Sender still alive: only the shutdown future could end the run
        drop(tx);
        assert!(!report.completed);
        assert!(console.text().contains("partial results"));
    }
}
