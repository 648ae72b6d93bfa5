//! Aggregate statistics over a metric's window

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::buffer::MetricBuffer;
use crate::error::BufferError;
use crate::models::MetricId;

/// Current/average/min/max for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub metric: MetricId,
    pub unit: String,
    pub current: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Samples in the window
    pub samples: usize,
    pub last_updated: DateTime<Utc>,
    /// Source failures seen for this metric since the last reset
    pub transient_errors: u64,
}

impl MetricStatistics {
    pub fn from_buffer(buffer: &MetricBuffer, transient_errors: u64) -> Result<Self, BufferError> {
        let latest = buffer.latest()?;
        Ok(Self {
            metric: buffer.metric(),
            unit: buffer.metric().unit().to_string(),
            current: latest.value,
            average: buffer.average()?,
            min: buffer.min()?,
            max: buffer.max()?,
            samples: buffer.len(),
            last_updated: latest.timestamp,
            transient_errors,
        })
    }

    /// Spread between the window's extremes
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

impl fmt::Display for MetricStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.metric.precision();
        write!(
            f,
            "{}: {:.*} {} (avg {:.1}, min {:.*}, max {:.*}, n={})",
            self.metric,
            p,
            self.current,
            self.unit,
            self.average,
            p,
            self.min,
            p,
            self.max,
            self.samples
        )
    }
}
