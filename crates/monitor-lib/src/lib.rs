//! Vital-signs monitoring core
//!
//! This crate provides:
//! - Bounded per-metric sample windows
//! - Threshold anomaly classification and a capped alert log
//! - Monitoring sessions driving a sample source on a fixed cadence
//! - Simulated and replayed sample sources
//! - Health tracking and observability

pub mod anomaly;
pub mod buffer;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod session;
pub mod source;
pub mod statistics;

pub use anomaly::{AlertLog, AnomalyClassifier, AnomalyEvent, Severity, ThresholdRule, ThresholdTable, Verdict};
pub use buffer::{MetricBuffer, SampleWindow};
pub use error::{BufferError, ConfigError, SessionError, SourceError};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use session::{
    MonitoringSession, SessionBuilder, SessionConfig, SessionEvent, SessionRegistry,
    SessionStatus, SessionSummary, TickReport,
};
pub use source::{ReplaySource, SampleSource, SimulatedSource};
pub use statistics::MetricStatistics;
