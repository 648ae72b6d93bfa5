//! Bounded sliding window of recent samples for one metric
//!
//! Keeps at most `capacity` samples in timestamp order with FIFO eviction.
//! Readers get [`SampleWindow`] snapshots that later pushes never touch.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::BufferError;
use crate::models::{MetricId, Sample};

/// Default window size
pub const DEFAULT_CAPACITY: usize = 30;

/// Fixed-capacity window of the most recent samples for a single metric
#[derive(Debug, Clone)]
pub struct MetricBuffer {
    metric: MetricId,
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl MetricBuffer {
    /// Create an empty buffer. A zero capacity is raised to one.
    pub fn new(metric: MetricId, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            metric,
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn metric(&self) -> MetricId {
        self.metric
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample, evicting the oldest one when the window is full.
    ///
    /// Samples older than the newest entry are rejected and leave the
    /// buffer unchanged. Equal timestamps are accepted.
    pub fn push(&mut self, sample: Sample) -> Result<(), BufferError> {
        if sample.metric != self.metric {
            return Err(BufferError::MetricMismatch {
                expected: self.metric,
                got: sample.metric,
            });
        }

        if let Some(newest) = self.samples.back() {
            if sample.timestamp < newest.timestamp {
                return Err(BufferError::OutOfOrderSample {
                    metric: self.metric,
                    timestamp: sample.timestamp,
                    newest: newest.timestamp,
                });
            }
        }

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        Ok(())
    }

    /// Most recent sample
    pub fn latest(&self) -> Result<Sample, BufferError> {
        self.samples
            .back()
            .copied()
            .ok_or(BufferError::Empty(self.metric))
    }

    /// Snapshot of the window, oldest to newest
    pub fn all(&self) -> SampleWindow {
        SampleWindow {
            samples: self.samples.iter().copied().collect(),
        }
    }

    /// Mean value over the window
    pub fn average(&self) -> Result<f64, BufferError> {
        if self.samples.is_empty() {
            return Err(BufferError::Empty(self.metric));
        }
        let sum: f64 = self.samples.iter().map(|s| s.value).sum();
        Ok(sum / self.samples.len() as f64)
    }

    /// Smallest value in the window
    pub fn min(&self) -> Result<f64, BufferError> {
        self.samples
            .iter()
            .map(|s| s.value)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or(BufferError::Empty(self.metric))
    }

    /// Largest value in the window
    pub fn max(&self) -> Result<f64, BufferError> {
        self.samples
            .iter()
            .map(|s| s.value)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or(BufferError::Empty(self.metric))
    }

    /// Drop every sample, keeping the capacity
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Immutable, cheaply cloneable snapshot of a buffer's samples
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    samples: Arc<[Sample]>,
}

impl SampleWindow {
    /// Iterate oldest to newest; can be called any number of times
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Values only, oldest to newest
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }
}

impl<'a> IntoIterator for &'a SampleWindow {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
