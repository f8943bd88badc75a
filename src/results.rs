use crate::metrics::{AggregateSnapshot, SnapshotMetrics};
use crate::percentile::LatencyPercentiles;
use crate::render;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Immutable outcome of a load-test run, computed once after the record
/// stream has been drained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Worker count the run was configured with
    pub concurrency: u64,
    pub aggregate: AggregateSnapshot,
    pub metrics: SnapshotMetrics,
    /// Wall time from the start of consumption to the end of the stream
    pub request_time: Duration,
    /// Records actually consumed (success + failure)
    pub total_requests: u64,
    /// `concurrency * requests_per_worker` when the per-worker count is known
    pub expected_requests: Option<u64>,
    pub sample_count: usize,
    pub percentiles: LatencyPercentiles,
    /// False when the run was interrupted or the stream failed
    pub completed: bool,
}

impl FinalReport {
    pub fn success_count(&self) -> u64 {
        self.aggregate.success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.aggregate.failure_count
    }
}

/// Destination for everything a run prints
///
/// Owns the console writer and the append-only HTML fragment that a larger
/// report document can embed. One sink is shared by the snapshot reporter and
/// the aggregator for the duration of a run.
pub struct ReportSink {
    console: Box<dyn Write + Send>,
    html: String,
    html_enabled: bool,
    progress_table_open: bool,
}

impl ReportSink {
    /// Create a sink that writes the console table to `console`
    pub fn new(console: Box<dyn Write + Send>) -> Self {
        Self {
            console,
            html: String::new(),
            html_enabled: true,
            progress_table_open: false,
        }
    }

    /// Create a sink that writes the console table to standard output
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Stop collecting the HTML fragment
    pub fn without_html(mut self) -> Self {
        self.html_enabled = false;
        self
    }

    /// Print the progress table header
    pub fn write_header(&mut self) -> io::Result<()> {
        if self.html_enabled {
            self.html.push_str(&render::html_progress_header());
            self.progress_table_open = true;
        }

        writeln!(self.console, "\n\n{}", render::console_header())?;
        self.console.flush()
    }

    /// Print one progress row for the given snapshot
    pub fn write_progress(
        &mut self,
        snapshot: &AggregateSnapshot,
        concurrency: u64,
    ) -> io::Result<()> {
        if self.html_enabled {
            self.html
                .push_str(&render::html_progress_row(snapshot, concurrency));
        }

        writeln!(self.console, "{}", render::console_row(snapshot, concurrency))?;
        self.console.flush()
    }

    /// Print the final summary block
    pub fn write_summary(&mut self, report: &FinalReport) -> io::Result<()> {
        if self.html_enabled {
            if self.progress_table_open {
                self.html.push_str(&render::html_progress_footer());
                self.progress_table_open = false;
            }
            self.html.push_str(&render::html_summary(report));
        }

        writeln!(self.console, "\n\n{}\n\n", render::console_summary(report))?;
        self.console.flush()
    }

    /// HTML collected so far
    pub fn html_fragment(&self) -> &str {
        &self.html
    }

    /// Write the HTML fragment to a file
    pub fn write_html<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), &self.html)?;
        info!("HTML report fragment written to: {:?}", path.as_ref());
        Ok(())
    }

    /// Write a final report as pretty JSON
    pub fn write_json<P: AsRef<Path>>(path: P, report: &FinalReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path.as_ref(), json)?;
        debug!("Final report for run {} serialized", report.run_id);
        info!("JSON report written to: {:?}", path.as_ref());
        Ok(())
    }
}

impl std::fmt::Debug for ReportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportSink")
            .field("html_len", &self.html.len())
            .field("html_enabled", &self.html_enabled)
            .field("progress_table_open", &self.progress_table_open)
            .finish()
    }
}
