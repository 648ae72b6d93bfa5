//! Error types for the monitoring core
//!
//! None of these are fatal to the process: the worst outcome is a metric
//! showing stale statistics until the next successful tick.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::models::MetricId;

/// Errors raised by a [`MetricBuffer`](crate::buffer::MetricBuffer)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BufferError {
    /// Sample is older than the newest buffered sample; it was dropped
    #[error("out-of-order sample for {metric}: {timestamp} is older than newest {newest}")]
    OutOfOrderSample {
        metric: MetricId,
        timestamp: DateTime<Utc>,
        newest: DateTime<Utc>,
    },

    /// Sample belongs to a different metric than the buffer
    #[error("sample for {got} pushed into {expected} buffer")]
    MetricMismatch { expected: MetricId, got: MetricId },

    /// No samples in the window
    #[error("no samples recorded for {0}")]
    Empty(MetricId),
}

/// Transient failures from a sample source
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("{metric} unavailable: {reason}")]
    Unavailable { metric: MetricId, reason: String },

    #[error("{metric} sample timed out after {after:?}")]
    Timeout { metric: MetricId, after: Duration },

    #[error("no more scripted samples for {metric}")]
    Exhausted { metric: MetricId },

    #[error("requested {expected} but source returned {got}")]
    Mismatch { expected: MetricId, got: MetricId },

    #[error("{metric} reading {value} is not a finite number")]
    InvalidValue { metric: MetricId, value: f64 },
}

impl SourceError {
    /// Metric the failure applies to
    pub fn metric(&self) -> MetricId {
        match self {
            SourceError::Unavailable { metric, .. }
            | SourceError::Timeout { metric, .. }
            | SourceError::Exhausted { metric }
            | SourceError::InvalidValue { metric, .. } => *metric,
            SourceError::Mismatch { expected, .. } => *expected,
        }
    }
}

/// Errors surfaced by a [`MonitoringSession`](crate::session::MonitoringSession)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("metric {0} is not tracked by this session")]
    MetricNotTracked(MetricId),

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("session is not connected")]
    NotConnected,

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("no async runtime available to drive the session ticker")]
    NoRuntime,
}

impl SessionError {
    /// Idempotency guards: the call was a no-op and the session is unaffected
    pub fn is_benign(&self) -> bool {
        matches!(self, SessionError::AlreadyConnected | SessionError::NotConnected)
    }
}

/// Invalid session configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("threshold for {metric} has lower bound {lower} above upper bound {upper}")]
    InvertedBounds {
        metric: MetricId,
        lower: f64,
        upper: f64,
    },
}
