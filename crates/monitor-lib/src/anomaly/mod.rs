//! Anomaly detection for vital-sign readings
//!
//! This module provides:
//! - Threshold classification of individual readings
//! - A capped, newest-first log of the resulting anomaly events

mod alert_log;
mod classifier;

pub use alert_log::{AlertLog, AnomalyEvent, DEFAULT_ALERT_CAPACITY};
pub use classifier::{
    AnomalyClassifier, Severity, ThresholdRule, ThresholdTable, Verdict, DEFAULT_MESSAGE,
};
