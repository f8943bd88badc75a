use crate::outcome::OutcomeRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

const NANOS_PER_SECOND: f64 = 1e9;
const NANOS_PER_MILLI: f64 = 1e6;

/// Running counters for a load-test run
///
/// Mutated only by the aggregator's consumption loop. Readers take an owned
/// [`AggregateSnapshot`] instead of looking at the fields directly.
#[derive(Debug)]
pub struct RunningAggregate {
    processing_time_ns: u64,
    max_latency_ns: u64,
    min_latency_ns: Option<u64>,
    success_count: u64,
    failure_count: u64,
    error_histogram: HashMap<i32, u64>,
    distinct_sources: HashSet<u64>,
    received_bytes_total: u64,
    run_start: Instant,
    started_at: DateTime<Utc>,
}

/// Point-in-time copy of a [`RunningAggregate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub elapsed: Duration,
    pub processing_time_ns: u64,
    pub max_latency_ns: u64,
    pub min_latency_ns: Option<u64>,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_histogram: HashMap<i32, u64>,
    /// Number of distinct workers seen so far (observed concurrency)
    pub observed_concurrency: usize,
    pub received_bytes_total: u64,
}

/// Rates and averages derived from an [`AggregateSnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    pub qps: f64,
    pub average_latency_ms: f64,
    pub max_latency_ms: f64,
    pub min_latency_ms: f64,
    pub elapsed_secs: f64,
    /// `None` when no record reported a positive byte count
    pub received_bytes: Option<u64>,
    pub bytes_per_second: Option<u64>,
}

impl RunningAggregate {
    /// Create an empty aggregate; the run clock starts now
    pub fn new() -> Self {
        Self {
            processing_time_ns: 0,
            max_latency_ns: 0,
            min_latency_ns: None,
            success_count: 0,
            failure_count: 0,
            error_histogram: HashMap::new(),
            distinct_sources: HashSet::new(),
            received_bytes_total: 0,
            run_start: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Fold one outcome into the counters
    pub fn record(&mut self, record: &OutcomeRecord) {
        let latency = record.latency_ns;
        self.processing_time_ns = self.processing_time_ns.saturating_add(latency);
        self.max_latency_ns = self.max_latency_ns.max(latency);
        self.min_latency_ns = Some(match self.min_latency_ns {
            Some(min) => min.min(latency),
            None => latency,
        });

        if record.succeeded {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        *self.error_histogram.entry(record.error_code).or_insert(0) += 1;
        self.distinct_sources.insert(record.source_id);

        if let Some(bytes) = record.known_received_bytes() {
            self.received_bytes_total = self.received_bytes_total.saturating_add(bytes);
        }
    }

    /// Take an owned copy of the current state
    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            elapsed: self.elapsed(),
            processing_time_ns: self.processing_time_ns,
            max_latency_ns: self.max_latency_ns,
            min_latency_ns: self.min_latency_ns,
            success_count: self.success_count,
            failure_count: self.failure_count,
            error_histogram: self.error_histogram.clone(),
            observed_concurrency: self.distinct_sources.len(),
            received_bytes_total: self.received_bytes_total,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.run_start.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total_records(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn observed_concurrency(&self) -> usize {
        self.distinct_sources.len()
    }

    pub fn received_bytes_total(&self) -> u64 {
        self.received_bytes_total
    }

    pub fn error_histogram(&self) -> &HashMap<i32, u64> {
        &self.error_histogram
    }
}

impl Default for RunningAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateSnapshot {
    pub fn total_records(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

impl SnapshotMetrics {
    /// Derive rates from a snapshot for the given worker count
    ///
    /// Degenerate inputs (no records, zero elapsed time, zero concurrency)
    /// produce zeros rather than dividing by zero.
    pub fn compute(snapshot: &AggregateSnapshot, concurrency: u64) -> Self {
        // Substitute 1ns so an empty run still yields a defined qps of 0
        let processing_time = snapshot.processing_time_ns.max(1) as f64;
        let qps = snapshot.success_count as f64 * concurrency as f64 * NANOS_PER_SECOND
            / processing_time;

        let average_latency_ms = if snapshot.success_count == 0 || concurrency == 0 {
            0.0
        } else {
            snapshot.processing_time_ns as f64
                / (snapshot.success_count as f64 * NANOS_PER_MILLI)
        };

        let elapsed_secs = snapshot.elapsed.as_secs_f64();
        let received_bytes = match snapshot.received_bytes_total {
            0 => None,
            total => Some(total),
        };
        let bytes_per_second = received_bytes.map(|total| {
            if elapsed_secs > 0.0 {
                (total as f64 / elapsed_secs) as u64
            } else {
                0
            }
        });

        Self {
            qps,
            average_latency_ms,
            max_latency_ms: snapshot.max_latency_ns as f64 / NANOS_PER_MILLI,
            min_latency_ms: snapshot.min_latency_ns.unwrap_or(0) as f64 / NANOS_PER_MILLI,
            elapsed_secs,
            received_bytes,
            bytes_per_second,
        }
    }
}
