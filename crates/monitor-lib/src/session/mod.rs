//! Monitoring sessions
//!
//! A [`MonitoringSession`] owns one buffer per tracked metric and an alert
//! log, and drives them from a [`SampleSource`] on a fixed cadence while
//! connected. Ticks are serialized per session, and readers only ever get
//! snapshots.

mod config;
mod registry;

pub use config::{SessionConfig, DEFAULT_CADENCE, DEFAULT_SAMPLE_TIMEOUT};
pub use registry::SessionRegistry;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::anomaly::{AlertLog, AnomalyClassifier, AnomalyEvent, ThresholdTable};
use crate::buffer::{MetricBuffer, SampleWindow};
use crate::error::{BufferError, SessionError, SourceError};
use crate::models::{MetricId, Sample};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::source::SampleSource;
use crate::statistics::MetricStatistics;

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Sequence number of the tick within the session
    pub tick: u64,
    /// Samples accepted into buffers
    pub ingested: Vec<Sample>,
    /// Samples dropped for arriving out of order
    pub rejected: Vec<Sample>,
    /// Metrics whose source failed this tick
    pub failures: Vec<SourceError>,
    /// Anomalies recorded in the alert log
    pub anomalies: Vec<AnomalyEvent>,
    pub elapsed: Duration,
}

impl TickReport {
    /// True when every tracked metric produced an accepted sample
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.rejected.is_empty()
    }

    pub fn failed_metrics(&self) -> Vec<MetricId> {
        self.failures.iter().map(SourceError::metric).collect()
    }

    /// Metrics attempted this tick
    pub fn attempted(&self) -> usize {
        self.ingested.len() + self.rejected.len() + self.failures.len()
    }
}

/// Notifications a session sends to an optional observer
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Transition {
        device_id: String,
        status: SessionStatus,
    },
    Tick {
        device_id: String,
        report: TickReport,
    },
}

/// Point-in-time overview of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub device_id: String,
    pub status: SessionStatus,
    pub tracked_metrics: Vec<MetricId>,
    pub alert_count: usize,
    pub transient_errors: u64,
    pub ticks: u64,
}

struct Ticker {
    shutdown: broadcast::Sender<()>,
    _handle: JoinHandle<()>,
}

impl Ticker {
    fn stop(self) {
        // the task finishes its current tick before observing this
        let _ = self.shutdown.send(());
    }
}

struct SessionState {
    status: SessionStatus,
    generation: u64,
    ticks: u64,
    buffers: BTreeMap<MetricId, MetricBuffer>,
    errors: HashMap<MetricId, u64>,
    alert_log: AlertLog,
    ticker: Option<Ticker>,
}

struct SessionInner {
    device_id: String,
    config: SessionConfig,
    classifier: AnomalyClassifier,
    source: Arc<dyn SampleSource>,
    state: RwLock<SessionState>,
    tick_lock: Mutex<()>,
    events: Option<mpsc::Sender<SessionEvent>>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

/// Handle to a monitoring session. Clones share the same session.
#[derive(Clone)]
pub struct MonitoringSession {
    inner: Arc<SessionInner>,
}

impl MonitoringSession {
    pub fn builder(device_id: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(device_id)
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read_state().status
    }

    /// Start tracking a metric. Returns false if it was already tracked.
    pub fn track_metric(&self, metric: MetricId) -> bool {
        let mut state = self.inner.write_state();
        if state.buffers.contains_key(&metric) {
            return false;
        }
        state
            .buffers
            .insert(metric, MetricBuffer::new(metric, self.inner.config.capacity));
        true
    }

    /// Stop tracking a metric, dropping its buffer and error count
    pub fn untrack_metric(&self, metric: MetricId) -> bool {
        let mut state = self.inner.write_state();
        state.errors.remove(&metric);
        state.buffers.remove(&metric).is_some()
    }

    pub fn tracked_metrics(&self) -> Vec<MetricId> {
        self.inner.read_state().buffers.keys().copied().collect()
    }

    /// Disconnected -> Connecting -> Connected, starting the periodic ticker.
    ///
    /// Returns [`SessionError::AlreadyConnected`] without side effects when
    /// the session is already connecting or connected. Must be called from
    /// within a tokio runtime.
    pub fn connect(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.write_state();
            if state.status != SessionStatus::Disconnected {
                return Err(SessionError::AlreadyConnected);
            }
            let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

            state.status = SessionStatus::Connecting;
            state.generation += 1;

            let (shutdown, shutdown_rx) = broadcast::channel(1);
            let handle = runtime.spawn(run_ticker(
                Arc::downgrade(&self.inner),
                self.inner.config.cadence,
                state.generation,
                shutdown_rx,
            ));
            state.ticker = Some(Ticker {
                shutdown,
                _handle: handle,
            });
            state.status = SessionStatus::Connected;
        }

        self.inner.metrics.session_connected();
        self.inner.on_transition(SessionStatus::Connected);
        Ok(())
    }

    /// Connected|Connecting -> Disconnected, cancelling the ticker.
    ///
    /// Buffers and alerts are kept until [`reset`](Self::reset). A tick in
    /// flight when this is called does not apply its results.
    pub fn disconnect(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.write_state();
            if state.status == SessionStatus::Disconnected {
                return Err(SessionError::NotConnected);
            }
            state.status = SessionStatus::Disconnected;
            if let Some(ticker) = state.ticker.take() {
                ticker.stop();
            }
        }

        self.inner.metrics.session_disconnected();
        self.inner.on_transition(SessionStatus::Disconnected);
        Ok(())
    }

    /// Clear buffers, alerts and error counters; tracked metrics and the
    /// connection state are kept
    pub fn reset(&self) {
        let mut state = self.inner.write_state();
        for buffer in state.buffers.values_mut() {
            buffer.clear();
        }
        state.errors.clear();
        state.alert_log.clear();
        debug!(device = %self.inner.device_id, "Session reset");
    }

    /// Run one tick now, serialized with the periodic ticker
    pub async fn tick(&self) -> Result<TickReport, SessionError> {
        self.inner.run_tick(None).await
    }

    /// Current, average, min and max for a tracked metric
    pub fn statistics(&self, metric: MetricId) -> Result<MetricStatistics, SessionError> {
        let state = self.inner.read_state();
        let buffer = state
            .buffers
            .get(&metric)
            .ok_or(SessionError::MetricNotTracked(metric))?;
        let errors = state.errors.get(&metric).copied().unwrap_or(0);
        Ok(MetricStatistics::from_buffer(buffer, errors)?)
    }

    /// Statistics for every tracked metric that has samples
    pub fn all_statistics(&self) -> Vec<MetricStatistics> {
        let state = self.inner.read_state();
        state
            .buffers
            .values()
            .filter_map(|buffer| {
                let errors = state.errors.get(&buffer.metric()).copied().unwrap_or(0);
                MetricStatistics::from_buffer(buffer, errors).ok()
            })
            .collect()
    }

    /// Snapshot of a metric's window, oldest to newest
    pub fn samples(&self, metric: MetricId) -> Result<SampleWindow, SessionError> {
        self.inner
            .read_state()
            .buffers
            .get(&metric)
            .map(MetricBuffer::all)
            .ok_or(SessionError::MetricNotTracked(metric))
    }

    /// Up to `k` newest alerts, newest first
    pub fn recent_alerts(&self, k: usize) -> Vec<AnomalyEvent> {
        self.inner.read_state().alert_log.recent(k)
    }

    /// Source failures recorded for a metric since the last reset
    pub fn transient_errors(&self, metric: MetricId) -> u64 {
        self.inner
            .read_state()
            .errors
            .get(&metric)
            .copied()
            .unwrap_or(0)
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.inner.read_state();
        SessionSummary {
            device_id: self.inner.device_id.clone(),
            status: state.status,
            tracked_metrics: state.buffers.keys().copied().collect(),
            alert_count: state.alert_log.len(),
            transient_errors: state.errors.values().sum(),
            ticks: state.ticks,
        }
    }
}

impl fmt::Debug for MonitoringSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringSession")
            .field("device_id", &self.inner.device_id)
            .field("status", &self.status())
            .finish()
    }
}

impl SessionInner {
    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch, then apply under one write lock so readers see whole ticks.
    ///
    /// `expected_generation` pins a ticker to the connection that spawned it.
    async fn run_tick(&self, expected_generation: Option<u64>) -> Result<TickReport, SessionError> {
        let _serialized = self.tick_lock.lock().await;
        let started = Instant::now();

        let (generation, metrics) = {
            let state = self.read_state();
            if state.status != SessionStatus::Connected {
                return Err(SessionError::NotConnected);
            }
            if expected_generation.is_some_and(|g| g != state.generation) {
                return Err(SessionError::NotConnected);
            }
            let metrics: Vec<MetricId> = state.buffers.keys().copied().collect();
            (state.generation, metrics)
        };

        let mut fetched = Vec::with_capacity(metrics.len());
        for metric in metrics {
            fetched.push((metric, self.fetch(metric).await));
        }

        let mut rejections = Vec::new();
        let report = {
            let mut guard = self.write_state();
            let state = &mut *guard;
            if state.status != SessionStatus::Connected || state.generation != generation {
                debug!(device = %self.device_id, "Discarding tick results after disconnect");
                return Err(SessionError::NotConnected);
            }

            state.ticks += 1;
            let mut report = TickReport {
                tick: state.ticks,
                ..Default::default()
            };

            for (metric, outcome) in fetched {
                let sample = match outcome {
                    Ok(sample) => sample,
                    Err(e) => {
                        *state.errors.entry(metric).or_default() += 1;
                        report.failures.push(e);
                        continue;
                    }
                };

                // untracked while the tick was fetching
                let Some(buffer) = state.buffers.get_mut(&metric) else {
                    continue;
                };
                if let Err(e) = buffer.push(sample) {
                    rejections.push(e);
                    report.rejected.push(sample);
                    continue;
                }
                report.ingested.push(sample);

                if let Some(event) = self.classifier.event_for(&sample) {
                    state.alert_log.record(event.clone());
                    report.anomalies.push(event);
                }
            }

            report.elapsed = started.elapsed();
            report
        };

        self.observe_tick(&report, &rejections);
        self.emit(SessionEvent::Tick {
            device_id: self.device_id.clone(),
            report: report.clone(),
        });
        Ok(report)
    }

    async fn fetch(&self, metric: MetricId) -> Result<Sample, SourceError> {
        let timeout = self.config.sample_timeout;
        match tokio::time::timeout(timeout, self.source.next_sample(metric)).await {
            Ok(Ok(sample)) if sample.metric != metric => Err(SourceError::Mismatch {
                expected: metric,
                got: sample.metric,
            }),
            // only finite readings reach the buffer
            Ok(Ok(sample)) if !sample.value.is_finite() => Err(SourceError::InvalidValue {
                metric,
                value: sample.value,
            }),
            Ok(Ok(sample)) => Ok(sample),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SourceError::Timeout {
                metric,
                after: timeout,
            }),
        }
    }

    fn observe_tick(&self, report: &TickReport, rejections: &[BufferError]) {
        self.metrics
            .observe_tick_latency(report.elapsed.as_secs_f64());
        for sample in &report.ingested {
            self.metrics.inc_samples_ingested(sample.metric);
        }
        for (sample, error) in report.rejected.iter().zip(rejections) {
            self.metrics.inc_samples_rejected(sample.metric);
            self.logger.log_sample_rejected(error);
        }
        for error in &report.failures {
            self.metrics.inc_sample_errors(error.metric());
            self.logger.log_source_error(error);
        }
        for event in &report.anomalies {
            self.metrics
                .inc_anomalies_detected(event.metric, event.severity);
            self.logger.log_anomaly(event);
        }
    }

    fn on_transition(&self, status: SessionStatus) {
        self.logger.log_transition(status);
        self.emit(SessionEvent::Transition {
            device_id: self.device_id.clone(),
            status,
        });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                debug!(device = %self.device_id, error = %e, "Dropped session event");
            }
        }
    }
}

/// Periodic tick loop for one connection generation
async fn run_ticker(
    session: Weak<SessionInner>,
    cadence: Duration,
    generation: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + cadence, cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let Some(inner) = session.upgrade() else {
                    break;
                };
                match inner.run_tick(Some(generation)).await {
                    Ok(_) => {}
                    Err(SessionError::NotConnected) => break,
                    Err(e) => warn!(device = %inner.device_id, error = %e, "Tick failed"),
                }
            }
        }
    }

    debug!(generation, "Session ticker stopped");
}

/// Builder for creating monitoring sessions
pub struct SessionBuilder {
    device_id: String,
    config: SessionConfig,
    source: Option<Arc<dyn SampleSource>>,
    metrics: Vec<MetricId>,
    events: Option<mpsc::Sender<SessionEvent>>,
}

impl SessionBuilder {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            config: SessionConfig::default(),
            source: None,
            metrics: Vec::new(),
            events: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the sample source
    pub fn source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the per-metric window size
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the alert log size
    pub fn alert_capacity(mut self, capacity: usize) -> Self {
        self.config.alert_capacity = capacity;
        self
    }

    /// Set the tick cadence
    pub fn cadence(mut self, cadence: Duration) -> Self {
        self.config.cadence = cadence;
        self
    }

    /// Set the per-request source deadline
    pub fn sample_timeout(mut self, timeout: Duration) -> Self {
        self.config.sample_timeout = timeout;
        self
    }

    /// Set the anomaly thresholds
    pub fn thresholds(mut self, thresholds: ThresholdTable) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Track a metric from the start
    pub fn track(mut self, metric: MetricId) -> Self {
        if !self.metrics.contains(&metric) {
            self.metrics.push(metric);
        }
        self
    }

    /// Track several metrics from the start
    pub fn track_all(self, metrics: impl IntoIterator<Item = MetricId>) -> Self {
        metrics.into_iter().fold(self, SessionBuilder::track)
    }

    /// Send lifecycle and tick notifications to `events`
    pub fn events(mut self, events: mpsc::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the session in the `Disconnected` state
    pub fn build(self) -> Result<MonitoringSession> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Sample source is required"))?;
        self.config
            .validate()
            .context("Invalid session configuration")?;

        let buffers = self
            .metrics
            .iter()
            .map(|metric| (*metric, MetricBuffer::new(*metric, self.config.capacity)))
            .collect();

        let state = SessionState {
            status: SessionStatus::Disconnected,
            generation: 0,
            ticks: 0,
            buffers,
            errors: HashMap::new(),
            alert_log: AlertLog::new(self.config.alert_capacity),
            ticker: None,
        };

        let inner = SessionInner {
            logger: StructuredLogger::new(self.device_id.clone()),
            device_id: self.device_id,
            classifier: AnomalyClassifier::new(self.config.thresholds.clone()),
            config: self.config,
            source,
            state: RwLock::new(state),
            tick_lock: Mutex::new(()),
            events: self.events,
            metrics: MonitorMetrics::new(),
        };

        Ok(MonitoringSession {
            inner: Arc::new(inner),
        })
    }
}

#[cfg(test)]
mod tests;
