//! Tail-latency extraction
//!
//! Percentiles use nearest-rank by truncation: the value at index
//! `floor(n * f)` of the ascending samples, clamped to the last index.
//! No interpolation is performed, so every reported value is an observed
//! latency.

use crate::error::AggregatorError;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// How the latency samples of a run are retained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PercentileMode {
    /// Keep every sample and sort once at stream end
    #[default]
    Exact,
    /// Bounded memory HDR histogram; values are accurate to the given
    /// number of significant decimal digits
    Histogram { significant_figures: u8 },
}

/// The p90/p95/p99 triple of a finished run, in nanoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p90: Option<u64>,
    pub p95: Option<u64>,
    pub p99: Option<u64>,
}

/// Return the sample at index `floor(n * fraction)` of `sorted`
///
/// `sorted` must be in ascending order. Returns `None` for an empty slice.
/// Fractions outside (0, 1) are clamped to the first or last sample.
pub fn percentile(sorted: &[u64], fraction: f64) -> Option<u64> {
    let last = sorted.len().checked_sub(1)?;
    // Float to int casts truncate toward zero and saturate at 0 for
    // negative or NaN inputs
    let index = (sorted.len() as f64 * fraction) as usize;
    Some(sorted[index.min(last)])
}

/// Append-only store of every latency observed during a run
#[derive(Debug)]
pub struct LatencySamples {
    store: SampleStore,
}

#[derive(Debug)]
enum SampleStore {
    Exact(Vec<u64>),
    Histogram(Histogram<u64>),
}

impl LatencySamples {
    /// Create an empty buffer for the given retention mode
    pub fn new(mode: PercentileMode) -> Result<Self, AggregatorError> {
        let store = match mode {
            PercentileMode::Exact => SampleStore::Exact(Vec::new()),
            PercentileMode::Histogram {
                significant_figures,
            } => {
                let histogram = Histogram::<u64>::new(significant_figures).map_err(|e| {
                    AggregatorError::InvalidConfig(format!(
                        "cannot create latency histogram with {} significant figures: {:?}",
                        significant_figures, e
                    ))
                })?;
                SampleStore::Histogram(histogram)
            }
        };

        Ok(Self { store })
    }

    /// Append one latency sample
    pub fn record(&mut self, latency_ns: u64) {
        match &mut self.store {
            SampleStore::Exact(samples) => samples.push(latency_ns),
            SampleStore::Histogram(histogram) => histogram.saturating_record(latency_ns),
        }
    }

    pub fn len(&self) -> usize {
        match &self.store {
            SampleStore::Exact(samples) => samples.len(),
            SampleStore::Histogram(histogram) => histogram.len() as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the buffer and compute p90, p95 and p99
    pub fn into_percentiles(self) -> LatencyPercentiles {
        match self.store {
            SampleStore::Exact(mut samples) => {
                samples.sort_unstable();
                LatencyPercentiles {
                    p90: percentile(&samples, 0.90),
                    p95: percentile(&samples, 0.95),
                    p99: percentile(&samples, 0.99),
                }
            }
            SampleStore::Histogram(histogram) => LatencyPercentiles {
                p90: histogram_percentile(&histogram, 0.90),
                p95: histogram_percentile(&histogram, 0.95),
                p99: histogram_percentile(&histogram, 0.99),
            },
        }
    }
}

/// Approximate `percentile` on a histogram by asking for the quantile that
/// covers the same rank the exact index would select
fn histogram_percentile(histogram: &Histogram<u64>, fraction: f64) -> Option<u64> {
    let count = histogram.len();
    if count == 0 {
        return None;
    }

    let index = ((count as f64 * fraction) as u64).min(count - 1);
    let quantile = (index + 1) as f64 / count as f64;
    Some(histogram.value_at_quantile(quantile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_truncates_index() {
        let samples = [10_000_000, 20_000_000, 30_000_000, 40_000_000];

        // floor(4 * 0.9) = 3
        assert_eq!(percentile(&samples, 0.90), Some(40_000_000));
        assert_eq!(percentile(&samples, 0.50), Some(30_000_000));
        assert_eq!(percentile(&samples, 0.20), Some(10_000_000));
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 0.99), None);
    }

    #[test]
    fn test_percentile_clamps_fraction() {
        let samples = [1, 2, 3];

        assert_eq!(percentile(&samples, 1.0), Some(3));
        assert_eq!(percentile(&samples, 5.0), Some(3));
        assert_eq!(percentile(&samples, -0.5), Some(1));
        assert_eq!(percentile(&samples, f64::NAN), Some(1));
    }

    #[test]
    fn test_percentile_is_member_and_monotonic() {
        let samples: Vec<u64> = (0..97u64).map(|i| (i * 7919) % 1000).collect();
        let mut sorted = samples.clone();
        sorted.sort_unstable();

        let mut previous = 0;
        for step in 1..100 {
            let fraction = step as f64 / 100.0;
            let value = percentile(&sorted, fraction).unwrap();
            assert!(samples.contains(&value));
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_exact_samples_sort_before_extraction() {
        let mut samples = LatencySamples::new(PercentileMode::Exact).unwrap();
        for latency in [40, 10, 30, 20] {
            samples.record(latency);
        }
        assert_eq!(samples.len(), 4);

        let percentiles = samples.into_percentiles();
        assert_eq!(percentiles.p90, Some(40));
        assert_eq!(percentiles.p95, Some(40));
        assert_eq!(percentiles.p99, Some(40));
    }

    #[test]
    fn test_empty_samples_have_no_percentiles() {
        let samples = LatencySamples::new(PercentileMode::Exact).unwrap();
        assert!(samples.is_empty());
        assert_eq!(samples.into_percentiles(), LatencyPercentiles::default());
    }

    #[test]
    fn test_histogram_mode_approximates_exact_values() {
        let mut exact = LatencySamples::new(PercentileMode::Exact).unwrap();
        let mut approximate = LatencySamples::new(PercentileMode::Histogram {
            significant_figures: 3,
        })
        .unwrap();
        for i in 1..=1000u64 {
            exact.record(i * 1_000_000);
            approximate.record(i * 1_000_000);
        }

        let exact = exact.into_percentiles();
        let approximate = approximate.into_percentiles();
        for (e, a) in [
            (exact.p90, approximate.p90),
            (exact.p95, approximate.p95),
            (exact.p99, approximate.p99),
        ] {
            let e = e.unwrap() as f64;
            let a = a.unwrap() as f64;
            assert!((a - e).abs() / e < 0.01, "exact {} approximate {}", e, a);
        }
    }

    #[test]
    fn test_histogram_mode_rejects_bad_precision() {
        let result = LatencySamples::new(PercentileMode::Histogram {
            significant_figures: 9,
        });
        assert!(matches!(result, Err(AggregatorError::InvalidConfig(_))));
    }
}
