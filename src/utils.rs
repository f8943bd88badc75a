//! ```rust
//! use stress_aggregator::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_thousands(1234567), "1,234,567");
//! assert_eq!(nanos_to_millis(1_500_000), 1.5);
//! assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
//! ```

use std::time::Duration;
use uuid::Uuid;

/// Generate a unique identifier for a load-test run
///
/// Tags the final report so the JSON file and the log lines of one run can
/// be matched up.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format an integer with English thousands separators
///
/// Byte counts in the progress table can grow large quickly; grouping the
/// digits keeps the fixed-width columns readable.
///
/// ## Examples
///
/// ```rust
/// # use stress_aggregator::utils::format_thousands;
/// assert_eq!(format_thousands(0), "0");
/// assert_eq!(format_thousands(999), "999");
/// assert_eq!(format_thousands(1000), "1,000");
/// assert_eq!(format_thousands(9876543210), "9,876,543,210");
/// ```
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    grouped
}

/// Convert nanoseconds to fractional milliseconds
pub fn nanos_to_millis(ns: u64) -> f64 {
    ns as f64 / 1e6
}

/// Short, human-readable run length for log lines
///
/// Sub-minute values keep two decimals in the largest fitting unit; longer
/// runs drop to whole seconds.
///
/// ```rust
/// # use stress_aggregator::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    const SUB_MINUTE_UNITS: [(u128, &str); 3] =
        [(1_000_000_000, "s"), (1_000_000, "ms"), (1_000, "μs")];

    let ns = duration.as_nanos();
    if ns < 1_000 {
        return format!("{}ns", ns);
    }
    if ns < 60_000_000_000 {
        for (scale, unit) in SUB_MINUTE_UNITS {
            if ns >= scale {
                return format!("{:.2}{}", ns as f64 / scale as f64, unit);
            }
        }
    }

    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    if hours == 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}h {}m {}s", hours, minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id_is_unique() {
        let first = generate_run_id();
        let second = generate_run_id();

        assert_eq!(first.len(), 36);
        assert_ne!(first, second);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(12), "12");
        assert_eq!(format_thousands(123), "123");
        assert_eq!(format_thousands(1234), "1,234");
        assert_eq!(format_thousands(123456), "123,456");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_nanos_to_millis() {
        assert_eq!(nanos_to_millis(0), 0.0);
        assert_eq!(nanos_to_millis(40_000_000), 40.0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50μs");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(7322)), "2h 2m 2s");
    }
}
