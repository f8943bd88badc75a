use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Byte count reported by transports that cannot observe the response body
pub const UNKNOWN_BYTES: i64 = -1;

/// Outcome of a single completed request, produced by a worker
///
/// Records are immutable once built and are consumed exactly once by the
/// aggregator. Only the latency value outlives aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Identifier of the worker that produced the record
    pub source_id: u64,
    pub latency_ns: u64,
    /// Canonical success signal; `error_code` is informational only
    pub succeeded: bool,
    pub error_code: i32,
    /// Negative when the transport could not report a body size
    pub received_bytes: i64,
}

impl OutcomeRecord {
    /// Create a successful outcome with error code 0 and unknown byte count
    pub fn success(source_id: u64, latency: Duration) -> Self {
        Self {
            source_id,
            latency_ns: duration_to_ns(latency),
            succeeded: true,
            error_code: 0,
            received_bytes: UNKNOWN_BYTES,
        }
    }

    /// Create a failed outcome carrying the transport's error code
    pub fn failure(source_id: u64, latency: Duration, error_code: i32) -> Self {
        Self {
            source_id,
            latency_ns: duration_to_ns(latency),
            succeeded: false,
            error_code,
            received_bytes: UNKNOWN_BYTES,
        }
    }

    pub fn with_error_code(mut self, error_code: i32) -> Self {
        self.error_code = error_code;
        self
    }

    pub fn with_received_bytes(mut self, received_bytes: i64) -> Self {
        self.received_bytes = received_bytes;
        self
    }

    /// Byte count if the transport reported one
    pub fn known_received_bytes(&self) -> Option<u64> {
        u64::try_from(self.received_bytes).ok()
    }

    pub fn latency(&self) -> Duration {
        Duration::from_nanos(self.latency_ns)
    }
}

fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
