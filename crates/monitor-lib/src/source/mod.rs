//! Sample sources feeding monitoring sessions
//!
//! A source produces one reading per requested metric per tick. Real
//! device drivers and simulators are interchangeable implementations.

mod replay;
mod simulator;

pub use replay::ReplaySource;
pub use simulator::SimulatedSource;

use crate::error::SourceError;
use crate::models::{MetricId, Sample};

pub use async_trait::async_trait;

/// Anything that can produce the next reading for a metric
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch the next sample for `metric`. Failures are transient.
    async fn next_sample(&self, metric: MetricId) -> Result<Sample, SourceError>;
}
