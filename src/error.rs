use crate::results::FinalReport;
use thiserror::Error;

/// Failures that end an aggregation run
///
/// Periodic snapshot output never produces one of these; only the one-shot
/// final report path may fail.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("invalid aggregator configuration: {0}")]
    InvalidConfig(String),

    /// The final report was computed but could not be printed. `report`
    /// is still handed back to the caller.
    #[error("failed to write report output: {source}")]
    Output {
        source: std::io::Error,
        report: Box<FinalReport>,
    },

    /// The record stream failed before closing cleanly. `partial` holds the
    /// best-effort report over everything consumed up to the failure.
    #[error("record stream failed before closing: {reason}")]
    StreamFailed {
        reason: String,
        partial: Box<FinalReport>,
    },
}

impl AggregatorError {
    /// Report attached to a failed run, if one was computed
    pub fn report(&self) -> Option<&FinalReport> {
        match self {
            AggregatorError::StreamFailed { partial, .. } => Some(partial),
            AggregatorError::Output { report, .. } => Some(report),
            AggregatorError::InvalidConfig(_) => None,
        }
    }
}
