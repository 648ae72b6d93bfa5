//! Observability infrastructure for the vitals monitor
//!
//! Provides:
//! - Prometheus metrics (tick latency, ingestion, source errors, anomalies)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::anomaly::{AnomalyEvent, Severity};
use crate::error::{BufferError, SourceError};
use crate::models::MetricId;
use crate::session::SessionStatus;

/// Histogram buckets for tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<Option<MonitorMetricsInner>> = OnceLock::new();

struct MonitorMetricsInner {
    tick_latency_seconds: Histogram,
    samples_ingested: IntCounterVec,
    samples_rejected: IntCounterVec,
    sample_errors: IntCounterVec,
    anomalies_detected: IntCounterVec,
    sessions_connected: IntGauge,
}

impl MonitorMetricsInner {
    fn register() -> Result<Self, prometheus::Error> {
        Ok(Self {
            tick_latency_seconds: register_histogram!(
                "vitals_tick_latency_seconds",
                "Time spent sampling, classifying and logging one session tick",
                LATENCY_BUCKETS.to_vec()
            )?,
            samples_ingested: register_int_counter_vec!(
                "vitals_samples_ingested_total",
                "Samples accepted into metric buffers",
                &["metric"]
            )?,
            samples_rejected: register_int_counter_vec!(
                "vitals_samples_rejected_total",
                "Samples dropped for arriving out of order",
                &["metric"]
            )?,
            sample_errors: register_int_counter_vec!(
                "vitals_sample_errors_total",
                "Transient sample source failures",
                &["metric"]
            )?,
            anomalies_detected: register_int_counter_vec!(
                "vitals_anomalies_detected_total",
                "Anomalous readings recorded in alert logs",
                &["metric", "severity"]
            )?,
            sessions_connected: register_int_gauge!(
                "vitals_sessions_connected",
                "Monitoring sessions currently connected"
            )?,
        })
    }
}

/// Monitor metrics for Prometheus exposition
///
/// A lightweight handle to the process-wide metrics. Clones share the same
/// underlying collectors. If registration failed, every call is a no-op.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match MonitorMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register Prometheus metrics");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&MonitorMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        if let Some(inner) = self.inner() {
            inner.tick_latency_seconds.observe(duration_secs);
        }
    }

    pub fn inc_samples_ingested(&self, metric: MetricId) {
        if let Some(inner) = self.inner() {
            inner
                .samples_ingested
                .with_label_values(&[metric.as_str()])
                .inc();
        }
    }

    pub fn inc_samples_rejected(&self, metric: MetricId) {
        if let Some(inner) = self.inner() {
            inner
                .samples_rejected
                .with_label_values(&[metric.as_str()])
                .inc();
        }
    }

    pub fn inc_sample_errors(&self, metric: MetricId) {
        if let Some(inner) = self.inner() {
            inner.sample_errors.with_label_values(&[metric.as_str()]).inc();
        }
    }

    pub fn inc_anomalies_detected(&self, metric: MetricId, severity: Severity) {
        if let Some(inner) = self.inner() {
            inner
                .anomalies_detected
                .with_label_values(&[metric.as_str(), severity.as_str()])
                .inc();
        }
    }

    pub fn session_connected(&self) {
        if let Some(inner) = self.inner() {
            inner.sessions_connected.inc();
        }
    }

    pub fn session_disconnected(&self) {
        if let Some(inner) = self.inner() {
            inner.sessions_connected.dec();
        }
    }
}

/// Structured logger for monitor events
///
/// Emits stable `event` records so log pipelines can index anomalies and
/// session transitions per device.
#[derive(Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Log a session lifecycle transition
    pub fn log_transition(&self, status: SessionStatus) {
        match status {
            SessionStatus::Connected => info!(
                event = "session_connected",
                device = %self.device,
                status = %status,
                "Monitoring session connected"
            ),
            SessionStatus::Disconnected => info!(
                event = "session_disconnected",
                device = %self.device,
                status = %status,
                "Monitoring session disconnected"
            ),
            SessionStatus::Connecting => debug!(
                event = "session_connecting",
                device = %self.device,
                "Monitoring session connecting"
            ),
        }
    }

    /// Log an anomalous reading
    pub fn log_anomaly(&self, event: &AnomalyEvent) {
        match event.severity {
            Severity::Critical => warn!(
                event = "anomaly_detected",
                device = %self.device,
                metric = %event.metric,
                severity = %event.severity,
                value = event.value,
                message = %event.message,
                "Critical anomaly detected"
            ),
            Severity::Warning => info!(
                event = "anomaly_detected",
                device = %self.device,
                metric = %event.metric,
                severity = %event.severity,
                value = event.value,
                message = %event.message,
                "Anomaly detected"
            ),
        }
    }

    /// Log a transient source failure
    pub fn log_source_error(&self, error: &SourceError) {
        warn!(
            event = "sample_source_error",
            device = %self.device,
            metric = %error.metric(),
            error = %error,
            "Sample source failed, keeping previous readings"
        );
    }

    /// Log a sample dropped by its buffer
    pub fn log_sample_rejected(&self, error: &BufferError) {
        debug!(
            event = "sample_rejected",
            device = %self.device,
            error = %error,
            "Sample rejected by metric buffer"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, devices: usize) {
        info!(
            event = "monitor_started",
            node = %self.device,
            version = %version,
            devices = devices,
            "Vitals monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            node = %self.device,
            reason = %reason,
            "Vitals monitor shutting down"
        );
    }
}
