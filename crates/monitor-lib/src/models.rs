//! Core data models for the vitals monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Vital-sign metrics a device can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    HeartRate,
    BloodOxygen,
    StepsCumulative,
    SystolicPressure,
    DiastolicPressure,
    BodyTemperature,
    RespiratoryRate,
}

impl MetricId {
    /// All known metrics, in display order
    pub const ALL: [MetricId; 7] = [
        MetricId::HeartRate,
        MetricId::BloodOxygen,
        MetricId::StepsCumulative,
        MetricId::SystolicPressure,
        MetricId::DiastolicPressure,
        MetricId::BodyTemperature,
        MetricId::RespiratoryRate,
    ];

    /// Stable snake_case name, as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::HeartRate => "heart_rate",
            MetricId::BloodOxygen => "blood_oxygen",
            MetricId::StepsCumulative => "steps_cumulative",
            MetricId::SystolicPressure => "systolic_pressure",
            MetricId::DiastolicPressure => "diastolic_pressure",
            MetricId::BodyTemperature => "body_temperature",
            MetricId::RespiratoryRate => "respiratory_rate",
        }
    }

    /// Unit the metric is reported in
    pub fn unit(&self) -> &'static str {
        match self {
            MetricId::HeartRate => "bpm",
            MetricId::BloodOxygen => "%",
            MetricId::StepsCumulative => "steps",
            MetricId::SystolicPressure | MetricId::DiastolicPressure => "mmHg",
            MetricId::BodyTemperature => "°C",
            MetricId::RespiratoryRate => "breaths/min",
        }
    }

    /// Physiologically valid range; simulated values are clamped to it
    pub fn valid_range(&self) -> RangeInclusive<f64> {
        match self {
            MetricId::HeartRate => 30.0..=220.0,
            MetricId::BloodOxygen => 70.0..=100.0,
            MetricId::StepsCumulative => 0.0..=100_000.0,
            MetricId::SystolicPressure => 70.0..=200.0,
            MetricId::DiastolicPressure => 40.0..=130.0,
            MetricId::BodyTemperature => 34.0..=42.0,
            MetricId::RespiratoryRate => 6.0..=40.0,
        }
    }

    /// Resting value a random walk starts from
    pub fn baseline(&self) -> f64 {
        match self {
            MetricId::HeartRate => 72.0,
            MetricId::BloodOxygen => 98.0,
            MetricId::StepsCumulative => 0.0,
            MetricId::SystolicPressure => 120.0,
            MetricId::DiastolicPressure => 80.0,
            MetricId::BodyTemperature => 36.6,
            MetricId::RespiratoryRate => 16.0,
        }
    }

    /// Largest change a simulated reading makes in one tick
    pub fn max_step(&self) -> f64 {
        match self {
            MetricId::HeartRate => 5.0,
            MetricId::BloodOxygen => 1.0,
            MetricId::StepsCumulative => 120.0,
            MetricId::SystolicPressure => 4.0,
            MetricId::DiastolicPressure => 3.0,
            MetricId::BodyTemperature => 0.2,
            MetricId::RespiratoryRate => 1.0,
        }
    }

    /// Number of decimal places readings are displayed and simulated with
    pub fn precision(&self) -> usize {
        match self {
            MetricId::BodyTemperature => 1,
            _ => 0,
        }
    }

    /// Round a raw reading to this metric's precision
    pub fn round(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.precision() as i32);
        (value * factor).round() / factor
    }

    /// Format a value with this metric's precision and unit
    pub fn format_value(&self, value: f64) -> String {
        format!("{:.*} {}", self.precision(), value, self.unit())
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            MetricId::HeartRate => "heart rate",
            MetricId::BloodOxygen => "blood oxygen",
            MetricId::StepsCumulative => "steps",
            MetricId::SystolicPressure => "systolic pressure",
            MetricId::DiastolicPressure => "diastolic pressure",
            MetricId::BodyTemperature => "body temperature",
            MetricId::RespiratoryRate => "respiratory rate",
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized metric name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric '{0}'")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricId {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let metric = match normalized.as_str() {
            "heart_rate" | "heartrate" | "hr" => MetricId::HeartRate,
            "blood_oxygen" | "bloodoxygen" | "spo2" | "oxygen" => MetricId::BloodOxygen,
            "steps_cumulative" | "steps" => MetricId::StepsCumulative,
            "systolic_pressure" | "systolic" => MetricId::SystolicPressure,
            "diastolic_pressure" | "diastolic" => MetricId::DiastolicPressure,
            "body_temperature" | "temperature" | "temp" => MetricId::BodyTemperature,
            "respiratory_rate" | "respiration" | "rr" => MetricId::RespiratoryRate,
            _ => return Err(UnknownMetric(s.to_string())),
        };
        Ok(metric)
    }
}

/// A single reading produced by a sample source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: MetricId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(metric: MetricId, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            metric,
            timestamp,
            value,
        }
    }

    /// Create a sample stamped with the current time
    pub fn now(metric: MetricId, value: f64) -> Self {
        Self::new(metric, Utc::now(), value)
    }
}
