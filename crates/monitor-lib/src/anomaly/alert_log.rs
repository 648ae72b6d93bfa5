//! Capped, newest-first log of anomaly events

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Severity;
use crate::models::{MetricId, Sample};

/// Default number of retained alerts
pub const DEFAULT_ALERT_CAPACITY: usize = 5;

/// A reading that violated its metric's threshold rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub metric: MetricId,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

impl AnomalyEvent {
    pub fn from_sample(sample: &Sample, message: String, severity: Severity) -> Self {
        Self {
            metric: sample.metric,
            value: sample.value,
            timestamp: sample.timestamp,
            message,
            severity,
        }
    }
}

/// Most-recent-first alert history holding at most `capacity` entries.
///
/// Every recorded event gets its own entry; identical anomalies are not
/// merged.
#[derive(Debug, Clone)]
pub struct AlertLog {
    capacity: usize,
    events: VecDeque<AnomalyEvent>,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    /// Insert at the head, dropping the oldest entries beyond capacity
    pub fn record(&mut self, event: AnomalyEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    /// Up to `k` newest entries, newest first
    pub fn recent(&self, k: usize) -> Vec<AnomalyEvent> {
        self.events.iter().take(k).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}
