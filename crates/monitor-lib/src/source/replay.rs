//! Scripted playback source
//!
//! Plays back fixed per-metric readings, one per request, stamped one
//! second apart from the moment the source was built. `None` entries
//! replay as transient failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::{async_trait, SampleSource};
use crate::error::SourceError;
use crate::models::{MetricId, Sample};

#[derive(Default)]
struct Script {
    steps: VecDeque<Option<f64>>,
    emitted: i64,
}

/// Source that replays recorded readings
pub struct ReplaySource {
    start: DateTime<Utc>,
    scripts: Mutex<HashMap<MetricId, Script>>,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Replay with timestamps counted from `start`
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            scripts: Mutex::new(HashMap::new()),
        }
    }

    /// Queue readings for a metric
    pub fn with_values(self, metric: MetricId, values: impl IntoIterator<Item = f64>) -> Self {
        self.with_steps(metric, values.into_iter().map(Some))
    }

    /// Queue readings and failures (`None`) for a metric
    pub fn with_steps(
        mut self,
        metric: MetricId,
        steps: impl IntoIterator<Item = Option<f64>>,
    ) -> Self {
        if let Ok(scripts) = self.scripts.get_mut() {
            scripts.entry(metric).or_default().steps.extend(steps);
        }
        self
    }

    /// Readings left for a metric
    pub fn remaining(&self, metric: MetricId) -> usize {
        self.scripts
            .lock()
            .map(|scripts| scripts.get(&metric).map_or(0, |s| s.steps.len()))
            .unwrap_or(0)
    }
}

impl Default for ReplaySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    async fn next_sample(&self, metric: MetricId) -> Result<Sample, SourceError> {
        let mut scripts = self.scripts.lock().map_err(|_| SourceError::Unavailable {
            metric,
            reason: "replay state poisoned".to_string(),
        })?;
        let script = scripts
            .get_mut(&metric)
            .ok_or(SourceError::Exhausted { metric })?;

        let step = script
            .steps
            .pop_front()
            .ok_or(SourceError::Exhausted { metric })?;
        let timestamp = self.start + Duration::seconds(script.emitted);
        script.emitted += 1;

        match step {
            Some(value) => Ok(Sample::new(metric, timestamp, value)),
            None => Err(SourceError::Unavailable {
                metric,
                reason: "scripted failure".to_string(),
            }),
        }
    }
}
