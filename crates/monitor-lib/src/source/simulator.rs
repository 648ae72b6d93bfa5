//! Random-walk simulator
//!
//! Each reading is the previous one plus a bounded uniform delta, clamped
//! to the metric's valid range. Cumulative step counts only walk upward.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{async_trait, SampleSource};
use crate::error::SourceError;
use crate::models::{MetricId, Sample};

struct WalkState {
    rng: StdRng,
    last: HashMap<MetricId, f64>,
}

/// Simulated device producing plausible vital signs
pub struct SimulatedSource {
    state: Mutex<WalkState>,
    failure_rate: f64,
}

impl SimulatedSource {
    /// Simulator seeded from OS entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible simulator
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(WalkState {
                rng,
                last: HashMap::new(),
            }),
            failure_rate: 0.0,
        }
    }

    /// Fail this fraction of requests with a transient error
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Start a metric's walk from `value` instead of its baseline
    pub fn with_start(mut self, metric: MetricId, value: f64) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.last.insert(metric, value);
        }
        self
    }

    fn next_value(&self, metric: MetricId) -> Result<f64, SourceError> {
        let mut state = self.state.lock().map_err(|_| SourceError::Unavailable {
            metric,
            reason: "simulator state poisoned".to_string(),
        })?;

        if self.failure_rate > 0.0 && state.rng.gen_bool(self.failure_rate) {
            return Err(SourceError::Unavailable {
                metric,
                reason: "simulated signal loss".to_string(),
            });
        }

        let previous = state
            .last
            .get(&metric)
            .copied()
            .unwrap_or_else(|| metric.baseline());
        let step = metric.max_step();
        let delta = match metric {
            MetricId::StepsCumulative => state.rng.gen_range(0.0..=step),
            _ => state.rng.gen_range(-step..=step),
        };

        let range = metric.valid_range();
        let value = metric.round((previous + delta).clamp(*range.start(), *range.end()));
        state.last.insert(metric, value);
        Ok(value)
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for SimulatedSource {
    async fn next_sample(&self, metric: MetricId) -> Result<Sample, SourceError> {
        let value = self.next_value(metric)?;
        Ok(Sample::now(metric, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_stay_in_valid_range() {
        let source = SimulatedSource::seeded(7);

        for metric in MetricId::ALL {
            let range = metric.valid_range();
            for _ in 0..500 {
                let sample = source.next_sample(metric).await.unwrap();
                assert_eq!(sample.metric, metric);
                assert!(range.contains(&sample.value), "{metric}: {}", sample.value);
            }
        }
    }

    #[tokio::test]
    async fn test_walk_is_bounded_per_step() {
        let source = SimulatedSource::seeded(42);
        let mut previous = MetricId::HeartRate.baseline();

        for _ in 0..200 {
            let value = source.next_sample(MetricId::HeartRate).await.unwrap().value;
            // rounding can add at most half a unit
            assert!((value - previous).abs() <= MetricId::HeartRate.max_step() + 0.5);
            previous = value;
        }
    }

    #[tokio::test]
    async fn test_steps_never_decrease() {
        let source = SimulatedSource::seeded(3);
        let mut previous = 0.0;

        for _ in 0..200 {
            let value = source.next_sample(MetricId::StepsCumulative).await.unwrap().value;
            assert!(value >= previous);
            previous = value;
        }
    }

    #[tokio::test]
    async fn test_seeded_sources_are_reproducible() {
        let a = SimulatedSource::seeded(99);
        let b = SimulatedSource::seeded(99);

        for _ in 0..20 {
            let va = a.next_sample(MetricId::BloodOxygen).await.unwrap().value;
            let vb = b.next_sample(MetricId::BloodOxygen).await.unwrap().value;
            assert_eq!(va, vb);
        }
    }

    #[tokio::test]
    async fn test_clamped_at_range_edge() {
        let source = SimulatedSource::seeded(1).with_start(MetricId::BloodOxygen, 100.0);

        for _ in 0..50 {
            let value = source.next_sample(MetricId::BloodOxygen).await.unwrap().value;
            assert!(value <= 100.0);
        }
    }

    #[tokio::test]
    async fn test_full_failure_rate() {
        let source = SimulatedSource::seeded(5).with_failure_rate(1.0);
        let result = source.next_sample(MetricId::HeartRate).await;
        assert!(matches!(result, Err(SourceError::Unavailable { .. })));
    }
}
