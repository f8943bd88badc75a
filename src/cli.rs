use crate::aggregator::AggregatorConfig;
use crate::percentile::PercentileMode;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Stress Aggregator - Simulated load test driving the result aggregation engine
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Number of concurrent workers
    #[clap(short = 'c', long, default_value_t = crate::defaults::CONCURRENCY, help_heading = "Core Options")]
    pub concurrency: u64,

    /// Requests performed by each worker
    #[clap(short = 'n', long, default_value_t = crate::defaults::REQUESTS_PER_WORKER, help_heading = "Core Options")]
    pub requests: u64,

    /// Interval between progress rows (e.g. "500ms", "1s", "1m")
    #[clap(long, value_parser = parse_duration, default_value = "1s")]
    pub interval: Duration,

    /// Mean simulated request latency
    #[clap(long, value_parser = parse_duration, default_value = "20ms")]
    pub mean_latency: Duration,

    /// Fraction of simulated requests that fail (0.0 - 1.0)
    #[clap(long, default_value_t = 0.05)]
    pub failure_rate: f64,

    /// Use a bounded-memory histogram instead of keeping every sample
    #[clap(long, default_value_t = false)]
    pub approximate_percentiles: bool,

    /// File to write the HTML report fragment to
    #[clap(long)]
    pub html_output: Option<PathBuf>,

    /// File to write the final report to (JSON format)
    #[clap(long)]
    pub json_output: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

impl From<&Args> for AggregatorConfig {
    fn from(args: &Args) -> Self {
        let percentile_mode = if args.approximate_percentiles {
            PercentileMode::Histogram {
                significant_figures: crate::defaults::HISTOGRAM_SIGNIFICANT_FIGURES,
            }
        } else {
            PercentileMode::Exact
        };

        Self {
            report_interval: args.interval,
            percentile_mode,
            requests_per_worker: Some(args.requests),
        }
    }
}

/// Value parser for `--interval` and `--mean-latency`
///
/// Accepts a non-negative, possibly fractional number with an optional
/// `ms`, `s`, `m` or `h` suffix; a bare number means seconds. Values that do
/// not fit a `Duration` are rejected instead of saturated.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (digits, millis_per_unit) = [("ms", 1.0), ("s", 1e3), ("m", 60e3), ("h", 3600e3)]
        .iter()
        .find_map(|&(suffix, scale)| s.strip_suffix(suffix).map(|rest| (rest, scale)))
        .unwrap_or((s, 1e3));

    let value: f64 = digits
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", digits))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    Duration::try_from_secs_f64(value * millis_per_unit / 1e3)
        .map_err(|e| format!("Duration out of range: {} ({})", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-3s").is_err());
        assert!(parse_duration("1e30s").is_err());
        assert!(parse_duration("1e30h").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["stress-aggregator"]);

        assert_eq!(args.concurrency, crate::defaults::CONCURRENCY);
        assert_eq!(args.requests, crate::defaults::REQUESTS_PER_WORKER);
        assert_eq!(args.interval, Duration::from_secs(1));
        assert!(args.html_output.is_none());
    }

    #[test]
    fn test_config_from_args() {
        let args = Args::parse_from([
            "stress-aggregator",
            "-c",
            "8",
            "-n",
            "50",
            "--interval",
            "250ms",
            "--approximate-percentiles",
        ]);
        let config = AggregatorConfig::from(&args);

        assert_eq!(config.report_interval, Duration::from_millis(250));
        assert_eq!(config.requests_per_worker, Some(50));
        assert_eq!(
            config.percentile_mode,
            PercentileMode::Histogram {
                significant_figures: crate::defaults::HISTOGRAM_SIGNIFICANT_FIGURES
            }
        );
    }
}
