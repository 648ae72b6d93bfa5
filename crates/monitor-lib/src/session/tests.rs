//! Session lifecycle and tick tests
//!
//! These drive sessions with scripted and instrumented sources. Cadence
//! tests run on tokio's paused clock.

use super::*;
use crate::anomaly::Severity;
use crate::source::{async_trait, ReplaySource, SimulatedSource};
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_test::{assert_err, assert_ok};

/// Long enough that the periodic ticker never fires during a test
const IDLE_CADENCE: Duration = Duration::from_secs(3600);

/// Source that counts requests and always reads a resting heart rate
struct CountingSource {
    calls: AtomicUsize,
}

impl CountingSource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SampleSource for CountingSource {
    async fn next_sample(&self, metric: MetricId) -> Result<Sample, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Sample::now(metric, 72.0))
    }
}

/// Source that takes `delay` to answer
struct SlowSource {
    delay: Duration,
}

#[async_trait]
impl SampleSource for SlowSource {
    async fn next_sample(&self, metric: MetricId) -> Result<Sample, SourceError> {
        tokio::time::sleep(self.delay).await;
        Ok(Sample::now(metric, 72.0))
    }
}

/// Source returning exact prepared samples in order
struct SequenceSource {
    samples: std::sync::Mutex<VecDeque<Sample>>,
}

#[async_trait]
impl SampleSource for SequenceSource {
    async fn next_sample(&self, metric: MetricId) -> Result<Sample, SourceError> {
        self.samples
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(SourceError::Exhausted { metric })
    }
}

fn session_with(source: Arc<dyn SampleSource>, metrics: &[MetricId]) -> MonitoringSession {
    MonitoringSession::builder("test-device")
        .source(source)
        .cadence(IDLE_CADENCE)
        .track_all(metrics.iter().copied())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_heart_rate_scenario() {
    let source = ReplaySource::new().with_values(MetricId::HeartRate, [72.0, 74.0, 105.0, 70.0]);
    let session = session_with(Arc::new(source), &[MetricId::HeartRate]);
    session.connect().unwrap();

    for _ in 0..4 {
        assert_ok!(session.tick().await);
    }

    let stats = session.statistics(MetricId::HeartRate).unwrap();
    assert_eq!(stats.current, 70.0);
    assert_eq!(stats.min, 70.0);
    assert_eq!(stats.max, 105.0);
    assert!((stats.average - 80.25).abs() < 1e-9);

    let alerts = session.recent_alerts(5);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].value, 105.0);
    assert_eq!(alerts[0].metric, MetricId::HeartRate);

    assert_eq!(session.samples(MetricId::HeartRate).unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_connect_twice_runs_one_ticker() {
    let source = Arc::new(CountingSource::new());
    let session = MonitoringSession::builder("test-device")
        .source(source.clone())
        .cadence(Duration::from_secs(5))
        .track(MetricId::HeartRate)
        .build()
        .unwrap();

    assert_ok!(session.connect());
    assert_eq!(session.connect(), Err(SessionError::AlreadyConnected));
    assert_eq!(session.status(), SessionStatus::Connected);

    // first tick fires one cadence after connect
    assert_eq!(source.calls(), 0);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(source.calls(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(session.samples(MetricId::HeartRate).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_ticker_and_keeps_data() {
    let source = Arc::new(CountingSource::new());
    let session = MonitoringSession::builder("test-device")
        .source(source.clone())
        .cadence(Duration::from_secs(5))
        .track(MetricId::HeartRate)
        .build()
        .unwrap();

    session.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(source.calls(), 1);

    assert_ok!(session.disconnect());
    assert_eq!(session.status(), SessionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(session.statistics(MetricId::HeartRate).unwrap().current, 72.0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_starts_fresh_ticker() {
    let source = Arc::new(CountingSource::new());
    let session = MonitoringSession::builder("test-device")
        .source(source.clone())
        .cadence(Duration::from_secs(5))
        .track(MetricId::HeartRate)
        .build()
        .unwrap();

    session.connect().unwrap();
    session.disconnect().unwrap();
    session.connect().unwrap();

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_tick_discarded_after_disconnect() {
    let source = Arc::new(SlowSource {
        delay: Duration::from_secs(1),
    });
    let session = session_with(source, &[MetricId::HeartRate]);
    session.connect().unwrap();

    let ticking = {
        let session = session.clone();
        tokio::spawn(async move { session.tick().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.disconnect().unwrap();

    let result = ticking.await.unwrap();
    assert_eq!(result.unwrap_err(), SessionError::NotConnected);
    assert!(session.samples(MetricId::HeartRate).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_tick_discarded_after_reconnect() {
    let source = Arc::new(SlowSource {
        delay: Duration::from_secs(1),
    });
    let session = session_with(source, &[MetricId::HeartRate]);
    session.connect().unwrap();

    let ticking = {
        let session = session.clone();
        tokio::spawn(async move { session.tick().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.disconnect().unwrap();
    session.connect().unwrap();

    // the tick started under the previous connection
    let result = ticking.await.unwrap();
    assert_eq!(result.unwrap_err(), SessionError::NotConnected);
    assert_eq!(session.status(), SessionStatus::Connected);
    assert!(session.samples(MetricId::HeartRate).unwrap().is_empty());
    assert_eq!(session.transient_errors(MetricId::HeartRate), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_times_out_as_transient_error() {
    let source = Arc::new(SlowSource {
        delay: Duration::from_secs(10),
    });
    let session = MonitoringSession::builder("test-device")
        .source(source)
        .cadence(IDLE_CADENCE)
        .sample_timeout(Duration::from_secs(2))
        .track(MetricId::HeartRate)
        .build()
        .unwrap();
    session.connect().unwrap();

    let report = session.tick().await.unwrap();

    assert_eq!(report.failed_metrics(), vec![MetricId::HeartRate]);
    assert!(matches!(report.failures[0], SourceError::Timeout { .. }));
    assert_eq!(session.transient_errors(MetricId::HeartRate), 1);
    assert_eq!(session.status(), SessionStatus::Connected);
}

#[tokio::test]
async fn test_source_failure_isolated_to_metric() {
    let source = ReplaySource::new()
        .with_values(MetricId::HeartRate, [72.0, 73.0])
        .with_steps(MetricId::BloodOxygen, [None, Some(97.0)]);
    let session = session_with(
        Arc::new(source),
        &[MetricId::HeartRate, MetricId::BloodOxygen],
    );
    session.connect().unwrap();

    let report = session.tick().await.unwrap();
    assert_eq!(report.ingested.len(), 1);
    assert_eq!(report.failed_metrics(), vec![MetricId::BloodOxygen]);
    assert!(!report.is_clean());
    assert_eq!(report.attempted(), 2);

    assert_eq!(session.statistics(MetricId::HeartRate).unwrap().current, 72.0);
    assert_eq!(
        session.statistics(MetricId::BloodOxygen),
        Err(SessionError::Buffer(BufferError::Empty(MetricId::BloodOxygen)))
    );
    assert_eq!(session.transient_errors(MetricId::BloodOxygen), 1);

    let report = session.tick().await.unwrap();
    assert!(report.is_clean());
    let oxygen = session.statistics(MetricId::BloodOxygen).unwrap();
    assert_eq!(oxygen.current, 97.0);
    assert_eq!(oxygen.transient_errors, 1);
    assert_eq!(session.status(), SessionStatus::Connected);
}

#[tokio::test]
async fn test_out_of_order_sample_rejected() {
    let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let samples = [
        Sample::new(MetricId::HeartRate, t, 70.0),
        Sample::new(MetricId::HeartRate, t + chrono::Duration::seconds(1), 71.0),
        Sample::new(MetricId::HeartRate, t - chrono::Duration::seconds(1), 150.0),
    ];
    let source = SequenceSource {
        samples: std::sync::Mutex::new(samples.into_iter().collect()),
    };
    let session = session_with(Arc::new(source), &[MetricId::HeartRate]);
    session.connect().unwrap();

    session.tick().await.unwrap();
    session.tick().await.unwrap();
    let report = session.tick().await.unwrap();

    assert_eq!(report.rejected.len(), 1);
    // a rejected sample is never classified
    assert!(report.anomalies.is_empty());
    let window = session.samples(MetricId::HeartRate).unwrap();
    let timestamps: Vec<_> = window.iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, vec![t, t + chrono::Duration::seconds(1)]);
    assert!(session.recent_alerts(5).is_empty());
}

#[tokio::test]
async fn test_mismatched_metric_counts_as_failure() {
    let source = SequenceSource {
        samples: std::sync::Mutex::new(VecDeque::from([Sample::now(MetricId::BloodOxygen, 97.0)])),
    };
    let session = session_with(Arc::new(source), &[MetricId::HeartRate]);
    session.connect().unwrap();

    let report = session.tick().await.unwrap();
    assert!(matches!(report.failures[0], SourceError::Mismatch { .. }));
    assert!(session.samples(MetricId::HeartRate).unwrap().is_empty());
}

#[tokio::test]
async fn test_non_finite_reading_skipped_as_transient_error() {
    let source = ReplaySource::new().with_values(MetricId::HeartRate, [72.0, f64::NAN, 74.0]);
    let session = session_with(Arc::new(source), &[MetricId::HeartRate]);
    session.connect().unwrap();

    assert!(session.tick().await.unwrap().is_clean());
    let report = session.tick().await.unwrap();
    assert!(report.ingested.is_empty());
    assert!(matches!(
        report.failures[0],
        SourceError::InvalidValue { metric: MetricId::HeartRate, .. }
    ));
    assert!(report.anomalies.is_empty());
    assert!(session.tick().await.unwrap().is_clean());

    let stats = session.statistics(MetricId::HeartRate).unwrap();
    assert_eq!(stats.average, 73.0);
    assert_eq!(stats.min, 72.0);
    assert_eq!(stats.max, 74.0);
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.transient_errors, 1);
    assert!(session.recent_alerts(5).is_empty());
}

#[tokio::test]
async fn test_alert_log_capped_through_session() {
    let values: Vec<f64> = (0..8).map(|i| 110.0 + i as f64).collect();
    let source = ReplaySource::new().with_values(MetricId::HeartRate, values);
    let session = session_with(Arc::new(source), &[MetricId::HeartRate]);
    session.connect().unwrap();

    for _ in 0..8 {
        session.tick().await.unwrap();
    }

    let alerts = session.recent_alerts(15);
    assert_eq!(alerts.len(), 5);
    let order: Vec<f64> = alerts.iter().map(|a| a.value).collect();
    assert_eq!(order, vec![117.0, 116.0, 115.0, 114.0, 113.0]);
}

#[tokio::test]
async fn test_tick_requires_connection() {
    let session = session_with(Arc::new(CountingSource::new()), &[MetricId::HeartRate]);
    assert_eq!(session.tick().await.unwrap_err(), SessionError::NotConnected);

    let err = assert_err!(session.disconnect());
    assert!(err.is_benign());
}

#[test]
fn test_connect_without_runtime() {
    let session = session_with(Arc::new(CountingSource::new()), &[MetricId::HeartRate]);
    assert_eq!(session.connect(), Err(SessionError::NoRuntime));
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_statistics_for_untracked_metric() {
    let session = session_with(Arc::new(CountingSource::new()), &[MetricId::HeartRate]);

    assert_eq!(
        session.statistics(MetricId::BodyTemperature),
        Err(SessionError::MetricNotTracked(MetricId::BodyTemperature))
    );
    assert!(session.samples(MetricId::BodyTemperature).is_err());

    assert!(session.track_metric(MetricId::BodyTemperature));
    assert!(!session.track_metric(MetricId::BodyTemperature));
    assert!(session.untrack_metric(MetricId::BodyTemperature));
    assert_eq!(session.tracked_metrics(), vec![MetricId::HeartRate]);
}

#[tokio::test]
async fn test_reset_clears_data_but_keeps_tracking() {
    let source = ReplaySource::new().with_values(MetricId::HeartRate, [120.0, 72.0]);
    let session = session_with(Arc::new(source), &[MetricId::HeartRate]);
    session.connect().unwrap();
    session.tick().await.unwrap();
    assert_eq!(session.recent_alerts(5).len(), 1);

    session.reset();

    assert!(session.recent_alerts(5).is_empty());
    assert!(session.samples(MetricId::HeartRate).unwrap().is_empty());
    assert_eq!(session.tracked_metrics(), vec![MetricId::HeartRate]);
    assert_eq!(session.status(), SessionStatus::Connected);

    session.tick().await.unwrap();
    assert_eq!(session.statistics(MetricId::HeartRate).unwrap().current, 72.0);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let a = session_with(
        Arc::new(ReplaySource::new().with_values(MetricId::HeartRate, [130.0])),
        &[MetricId::HeartRate],
    );
    let b = session_with(Arc::new(SimulatedSource::seeded(1)), &[MetricId::HeartRate]);
    a.connect().unwrap();
    b.connect().unwrap();

    a.tick().await.unwrap();

    assert_eq!(a.recent_alerts(5).len(), 1);
    assert!(b.recent_alerts(5).is_empty());
    assert!(b.samples(MetricId::HeartRate).unwrap().is_empty());
}

#[tokio::test]
async fn test_events_emitted_to_observer() {
    let (tx, mut rx) = mpsc::channel(16);
    let session = MonitoringSession::builder("observed")
        .source(Arc::new(CountingSource::new()))
        .cadence(IDLE_CADENCE)
        .track(MetricId::HeartRate)
        .events(tx)
        .build()
        .unwrap();

    session.connect().unwrap();
    session.tick().await.unwrap();
    session.disconnect().unwrap();

    match rx.try_recv().unwrap() {
        SessionEvent::Transition { device_id, status } => {
            assert_eq!(device_id, "observed");
            assert_eq!(status, SessionStatus::Connected);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match rx.try_recv().unwrap() {
        SessionEvent::Tick { report, .. } => assert_eq!(report.ingested.len(), 1),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        rx.try_recv().unwrap(),
        SessionEvent::Transition {
            status: SessionStatus::Disconnected,
            ..
        }
    ));
}

#[tokio::test]
async fn test_summary() {
    let source = ReplaySource::new()
        .with_values(MetricId::HeartRate, [101.0])
        .with_steps(MetricId::BloodOxygen, [None]);
    let session = session_with(
        Arc::new(source),
        &[MetricId::HeartRate, MetricId::BloodOxygen],
    );
    session.connect().unwrap();
    session.tick().await.unwrap();

    let summary = session.summary();
    assert_eq!(summary.device_id, "test-device");
    assert_eq!(summary.status, SessionStatus::Connected);
    assert_eq!(summary.alert_count, 1);
    assert_eq!(summary.transient_errors, 1);
    assert_eq!(summary.ticks, 1);
    assert_eq!(
        summary.tracked_metrics,
        vec![MetricId::HeartRate, MetricId::BloodOxygen]
    );
}

#[test]
fn test_builder_requires_source() {
    let result = MonitoringSession::builder("x").build();
    assert!(result.is_err());

    let result = MonitoringSession::builder("x")
        .source(Arc::new(CountingSource::new()))
        .capacity(0)
        .build();
    assert!(result.is_err());
}
