//! Session configuration

use std::time::Duration;

use crate::anomaly::{ThresholdTable, DEFAULT_ALERT_CAPACITY};
use crate::buffer::DEFAULT_CAPACITY;
use crate::error::ConfigError;

/// Default tick cadence
pub const DEFAULT_CADENCE: Duration = Duration::from_secs(5);

/// Default deadline for a single source request
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for a monitoring session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Samples kept per metric (default: 30)
    pub capacity: usize,
    /// Alerts kept in the log (default: 5)
    pub alert_capacity: usize,
    /// Interval between ticks (default: 5 seconds)
    pub cadence: Duration,
    /// Deadline for each source request within a tick (default: 2 seconds)
    pub sample_timeout: Duration,
    /// Per-metric anomaly rules
    pub thresholds: ThresholdTable,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            cadence: DEFAULT_CADENCE,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
            thresholds: ThresholdTable::defaults(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Zero("capacity"));
        }
        if self.cadence.is_zero() {
            return Err(ConfigError::Zero("cadence"));
        }
        if self.sample_timeout.is_zero() {
            return Err(ConfigError::Zero("sample_timeout"));
        }
        self.thresholds.validate()
    }
}
