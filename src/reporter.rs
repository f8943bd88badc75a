//! Periodic progress output
//!
//! The reporter runs as its own tokio task next to the consumption loop. It
//! reads the shared aggregate through the same mutex the consumer updates it
//! under, copies a snapshot, releases the lock and only then renders.

use crate::metrics::RunningAggregate;
use crate::results::ReportSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Stand-in for a first tick that cannot be represented
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline of the first progress row
fn first_tick(now: Instant, interval: Duration) -> Instant {
    now.checked_add(interval).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Handle to a running snapshot reporter task
#[derive(Debug)]
pub struct SnapshotReporter {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

impl SnapshotReporter {
    /// Spawn the reporter; the first row is emitted one full `interval`
    /// after start
    ///
    /// `interval` must be non-zero.
    pub fn start(
        aggregate: Arc<Mutex<RunningAggregate>>,
        concurrency: u64,
        interval: Duration,
        sink: Arc<Mutex<ReportSink>>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(first_tick(Instant::now(), interval), interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut rows = 0u64;

            loop {
                tokio::select! {
                    biased;
                    // Also resolves if the handle was dropped without stop()
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let snapshot = aggregate.lock().snapshot();
                        match sink.lock().write_progress(&snapshot, concurrency) {
                            Ok(()) => rows += 1,
                            Err(e) => warn!("Failed to write progress row: {}", e),
                        }
                    }
                }
            }

            rows
        });

        debug!("Snapshot reporter started with interval {:?}", interval);
        Self { stop_tx, handle }
    }

    /// Stop the reporter and wait until its task has exited
    ///
    /// Once this returns no further progress row can be written. Returns the
    /// number of rows the reporter emitted.
    pub async fn stop(self) -> u64 {
        // The task may already be gone if it panicked
        let _ = self.stop_tx.send(());

        match self.handle.await {
            Ok(rows) => {
                debug!("Snapshot reporter stopped after {} rows", rows);
                rows
            }
            Err(e) => {
                warn!("Snapshot reporter task failed: {}", e);
                0
            }
        }
    }
}
