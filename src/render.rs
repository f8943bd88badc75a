//! Pure formatting of aggregate state into console rows and HTML fragments
//!
//! Nothing here performs IO or touches shared state; rendering the same
//! snapshot twice yields identical text. Byte fields are rendered empty when
//! unknown so they stay distinguishable from a measured zero.

use crate::metrics::{AggregateSnapshot, SnapshotMetrics};
use crate::results::FinalReport;
use crate::utils::{format_thousands, nanos_to_millis};
use std::collections::HashMap;

const HEADER_TOP: &str =
    "─────┬───────┬───────┬───────┬────────┬────────┬────────┬────────┬────────┬────────┬────────";
const HEADER_TITLES: &str =
    " Time│ Concur│Success│Failure│   qps  │ Max ms │ Min ms │ Avg ms │  Bytes │ Bytes/s│ Codes";
const HEADER_BOTTOM: &str =
    "─────┼───────┼───────┼───────┼────────┼────────┼────────┼────────┼────────┼────────┼────────";

const SUMMARY_START: &str = "*************************  Result start  ****************************";
const SUMMARY_END: &str = "*************************  Result end    ****************************";

const HTML_PROGRESS_COLUMNS: [&str; 12] = [
    "Detail", "Time", "Concurrency", "Success", "Failure", "qps", "Max ms", "Min ms",
    "Avg ms", "Bytes", "Bytes/s", "Codes",
];

const HTML_SUMMARY_COLUMNS: [&str; 9] = [
    "Summary",
    "Concurrency",
    "Total requests (concurrency * requests per worker)",
    "Total request time",
    "Success",
    "Failure",
    "tp90",
    "tp95",
    "tp99",
];

/// Column values of one progress row, already padded to the table widths
struct ProgressFields {
    elapsed: String,
    concurrency: String,
    success: String,
    failure: String,
    qps: String,
    max_latency: String,
    min_latency: String,
    average_latency: String,
    received_bytes: String,
    bytes_per_second: String,
    error_codes: String,
}

impl ProgressFields {
    fn new(snapshot: &AggregateSnapshot, concurrency: u64) -> Self {
        let metrics = SnapshotMetrics::compute(snapshot, concurrency);
        let bytes = |value: Option<u64>| value.map(format_thousands).unwrap_or_default();

        Self {
            elapsed: format!("{:4.0}s", metrics.elapsed_secs),
            concurrency: format!("{:7}", snapshot.observed_concurrency),
            success: format!("{:7}", snapshot.success_count),
            failure: format!("{:7}", snapshot.failure_count),
            qps: format!("{:8.2}", metrics.qps),
            max_latency: format!("{:8.2}", metrics.max_latency_ms),
            min_latency: format!("{:8.2}", metrics.min_latency_ms),
            average_latency: format!("{:8.2}", metrics.average_latency_ms),
            received_bytes: format!("{:>8}", bytes(metrics.received_bytes)),
            bytes_per_second: format!("{:>8}", bytes(metrics.bytes_per_second)),
            error_codes: error_codes(&snapshot.error_histogram),
        }
    }

    fn cells(&self) -> [&str; 11] {
        [
            self.elapsed.as_str(),
            self.concurrency.as_str(),
            self.success.as_str(),
            self.failure.as_str(),
            self.qps.as_str(),
            self.max_latency.as_str(),
            self.min_latency.as_str(),
            self.average_latency.as_str(),
            self.received_bytes.as_str(),
            self.bytes_per_second.as_str(),
            self.error_codes.as_str(),
        ]
    }
}

/// Column values of the final summary
struct SummaryFields {
    concurrency: String,
    total_requests: String,
    request_time: String,
    success: String,
    failure: String,
    tp90: String,
    tp95: String,
    tp99: String,
}

impl SummaryFields {
    fn new(report: &FinalReport) -> Self {
        let millis = |value: Option<u64>| format!("{:.3}", nanos_to_millis(value.unwrap_or(0)));

        Self {
            concurrency: report.concurrency.to_string(),
            total_requests: report.total_requests.to_string(),
            request_time: format!("{:.3}", report.request_time.as_secs_f64()),
            success: report.aggregate.success_count.to_string(),
            failure: report.aggregate.failure_count.to_string(),
            tp90: millis(report.percentiles.p90),
            tp95: millis(report.percentiles.p95),
            tp99: millis(report.percentiles.p99),
        }
    }
}

/// Render the error histogram as `code:count` pairs joined by `;`
///
/// Entries are sorted by their rendered text so the output does not depend
/// on hash map iteration order.
pub fn error_codes(histogram: &HashMap<i32, u64>) -> String {
    let mut entries: Vec<String> = histogram
        .iter()
        .map(|(code, count)| format!("{}:{}", code, count))
        .collect();
    entries.sort();
    entries.join(";")
}

/// Three-line table header matching [`console_row`]
pub fn console_header() -> String {
    [HEADER_TOP, HEADER_TITLES, HEADER_BOTTOM].join("\n")
}

/// One fixed-width progress row
pub fn console_row(snapshot: &AggregateSnapshot, concurrency: u64) -> String {
    ProgressFields::new(snapshot, concurrency).cells().join("│")
}

/// Bracketed summary block printed once at the end of a run
pub fn console_summary(report: &FinalReport) -> String {
    let fields = SummaryFields::new(report);
    let mut lines = vec![SUMMARY_START.to_string()];

    if !report.completed {
        lines.push("Run did not complete, showing partial results".to_string());
    }
    lines.push(format!("Concurrency: {}", fields.concurrency));

    let mut totals = format!(
        "Total requests (concurrency * requests per worker): {}",
        fields.total_requests
    );
    if let Some(expected) = report.expected_requests {
        totals.push_str(&format!(" of {}", expected));
    }
    totals.push_str(&format!(
        "  Total request time: {} s  Success: {}  Failure: {}",
        fields.request_time, fields.success, fields.failure
    ));
    lines.push(totals);

    lines.push(format!("tp90: {}", fields.tp90));
    lines.push(format!("tp95: {}", fields.tp95));
    lines.push(format!("tp99: {}", fields.tp99));
    lines.push(SUMMARY_END.to_string());

    lines.join("\n")
}

/// Opening of the progress table in the HTML report
pub fn html_progress_header() -> String {
    format!(
        "<h5>Progress</h5><table border='1'>{}",
        html_row("th", &HTML_PROGRESS_COLUMNS)
    )
}

/// One progress row of the HTML report
pub fn html_progress_row(snapshot: &AggregateSnapshot, concurrency: u64) -> String {
    let fields = ProgressFields::new(snapshot, concurrency);
    let mut cells = vec!["Detail"];
    cells.extend(fields.cells());
    html_row("td", &cells)
}

/// Closing of the progress table
pub fn html_progress_footer() -> String {
    "</table><br/>".to_string()
}

/// Result table of the HTML report
pub fn html_summary(report: &FinalReport) -> String {
    let fields = SummaryFields::new(report);
    let request_time = format!("{} s", fields.request_time);
    let values = [
        "Result",
        fields.concurrency.as_str(),
        fields.total_requests.as_str(),
        request_time.as_str(),
        fields.success.as_str(),
        fields.failure.as_str(),
        fields.tp90.as_str(),
        fields.tp95.as_str(),
        fields.tp99.as_str(),
    ];

    format!(
        "<h5>Result</h5><table border='1'>{}{}</table><br/>",
        html_row("th", &HTML_SUMMARY_COLUMNS),
        html_row("td", &values)
    )
}

fn html_row(tag: &str, cells: &[&str]) -> String {
    let mut row = String::from("<tr>");
    for cell in cells {
        row.push_str(&format!("<{tag}>{cell}</{tag}>", tag = tag, cell = cell));
    }
    row.push_str("</tr>");
    row
}
