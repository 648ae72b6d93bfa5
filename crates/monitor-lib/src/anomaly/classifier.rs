//! Threshold-based anomaly classification
//!
//! Each metric maps to at most one [`ThresholdRule`]. Bounds are exclusive:
//! a value exactly on a bound is normal. Metrics without a rule are always
//! normal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::AnomalyEvent;
use crate::error::ConfigError;
use crate::models::{MetricId, Sample};

/// Default message template for threshold breaches
pub const DEFAULT_MESSAGE: &str = "Abnormal {metric}: {value} {unit} is {direction} the {bound} {unit} limit";

/// Severity of an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Normal,
    Warning(String),
    Critical(String),
}

impl Verdict {
    pub fn is_anomalous(&self) -> bool {
        !matches!(self, Verdict::Normal)
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            Verdict::Normal => None,
            Verdict::Warning(_) => Some(Severity::Warning),
            Verdict::Critical(_) => Some(Severity::Critical),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Normal => None,
            Verdict::Warning(reason) | Verdict::Critical(reason) => Some(reason),
        }
    }
}

/// Declarative bounds for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Values strictly below this are abnormal
    #[serde(default)]
    pub lower: Option<f64>,
    /// Values strictly above this are abnormal
    #[serde(default)]
    pub upper: Option<f64>,
    pub severity: Severity,
    /// Template with `{metric}`, `{value}`, `{unit}`, `{direction}` and `{bound}`
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

impl ThresholdRule {
    pub fn new(lower: Option<f64>, upper: Option<f64>, severity: Severity) -> Self {
        Self {
            lower,
            upper,
            severity,
            message: default_message(),
        }
    }

    /// Rule with both bounds
    pub fn between(lower: f64, upper: f64, severity: Severity) -> Self {
        Self::new(Some(lower), Some(upper), severity)
    }

    /// Rule with only a lower bound
    pub fn below(lower: f64, severity: Severity) -> Self {
        Self::new(Some(lower), None, severity)
    }

    /// Rule with only an upper bound
    pub fn above(upper: f64, severity: Severity) -> Self {
        Self::new(None, Some(upper), severity)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Returns the breached bound and its direction, if any
    fn breach(&self, value: f64) -> Option<(&'static str, f64)> {
        if let Some(upper) = self.upper {
            if value > upper {
                return Some(("above", upper));
            }
        }
        if let Some(lower) = self.lower {
            if value < lower {
                return Some(("below", lower));
            }
        }
        None
    }

    fn render(&self, metric: MetricId, value: f64, direction: &str, bound: f64) -> String {
        let precision = metric.precision();
        self.message
            .replace("{metric}", metric.label())
            .replace("{value}", &format!("{:.*}", precision, value))
            .replace("{unit}", metric.unit())
            .replace("{direction}", direction)
            .replace("{bound}", &format!("{:.*}", precision, bound))
    }
}

/// Threshold rules keyed by metric
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    rules: HashMap<MetricId, ThresholdRule>,
}

impl ThresholdTable {
    /// Empty table; every metric classifies as normal
    pub fn empty() -> Self {
        Self::default()
    }

    /// Canonical rules
    pub fn defaults() -> Self {
        Self::empty()
            .with_rule(
                MetricId::HeartRate,
                ThresholdRule::between(50.0, 100.0, Severity::Critical),
            )
            .with_rule(
                MetricId::BloodOxygen,
                ThresholdRule::below(95.0, Severity::Warning),
            )
            .with_rule(
                MetricId::SystolicPressure,
                ThresholdRule::between(90.0, 140.0, Severity::Warning),
            )
            .with_rule(
                MetricId::DiastolicPressure,
                ThresholdRule::between(60.0, 90.0, Severity::Warning),
            )
            .with_rule(
                MetricId::BodyTemperature,
                ThresholdRule::between(35.5, 37.5, Severity::Warning),
            )
            .with_rule(
                MetricId::RespiratoryRate,
                ThresholdRule::between(12.0, 20.0, Severity::Warning),
            )
    }

    pub fn with_rule(mut self, metric: MetricId, rule: ThresholdRule) -> Self {
        self.rules.insert(metric, rule);
        self
    }

    pub fn insert(&mut self, metric: MetricId, rule: ThresholdRule) -> Option<ThresholdRule> {
        self.rules.insert(metric, rule)
    }

    pub fn get(&self, metric: MetricId) -> Option<&ThresholdRule> {
        self.rules.get(&metric)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Reject rules whose lower bound exceeds the upper bound
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (metric, rule) in &self.rules {
            if let (Some(lower), Some(upper)) = (rule.lower, rule.upper) {
                if lower > upper {
                    return Err(ConfigError::InvertedBounds {
                        metric: *metric,
                        lower,
                        upper,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Stateless classifier over an immutable threshold table
#[derive(Debug, Clone)]
pub struct AnomalyClassifier {
    table: ThresholdTable,
}

impl AnomalyClassifier {
    pub fn new(table: ThresholdTable) -> Self {
        Self { table }
    }

    pub fn with_defaults() -> Self {
        Self::new(ThresholdTable::defaults())
    }

    pub fn rule(&self, metric: MetricId) -> Option<&ThresholdRule> {
        self.table.get(metric)
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    /// Classify one reading against its metric's rule
    pub fn classify(&self, metric: MetricId, value: f64) -> Verdict {
        let Some(rule) = self.table.get(metric) else {
            return Verdict::Normal;
        };

        match rule.breach(value) {
            None => Verdict::Normal,
            Some((direction, bound)) => {
                let reason = rule.render(metric, value, direction, bound);
                match rule.severity {
                    Severity::Warning => Verdict::Warning(reason),
                    Severity::Critical => Verdict::Critical(reason),
                }
            }
        }
    }

    /// Build the anomaly event for a sample, or `None` when it is normal
    pub fn event_for(&self, sample: &Sample) -> Option<AnomalyEvent> {
        match self.classify(sample.metric, sample.value) {
            Verdict::Normal => None,
            Verdict::Warning(message) => Some(AnomalyEvent::from_sample(
                sample,
                message,
                Severity::Warning,
            )),
            Verdict::Critical(message) => Some(AnomalyEvent::from_sample(
                sample,
                message,
                Severity::Critical,
            )),
        }
    }
}

impl Default for AnomalyClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}
