//! Monitor configuration

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Environment, File};
use monitor_lib::{
    MetricId, MonitoringSession, SessionConfig, SessionEvent, SessionRegistry, SimulatedSource,
    ThresholdRule, ThresholdTable,
};
use serde::Deserialize;
use tokio::sync::mpsc;

/// Config file used when `VITALS_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "vitals-monitor.toml";

const ENV_PREFIX: &str = "VITALS";

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// API server port for health, metrics and device endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Tick cadence in seconds
    #[serde(default = "default_cadence_secs")]
    pub cadence_secs: u64,

    /// Deadline for a single sample request in milliseconds
    #[serde(default = "default_sample_timeout_ms")]
    pub sample_timeout_ms: u64,

    /// Samples kept per metric
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Alerts kept per device
    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,

    /// Threshold overrides keyed by metric name
    #[serde(default)]
    pub thresholds: HashMap<String, ThresholdRule>,

    /// Monitored devices
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceConfig>,
}

/// One simulated device
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,

    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,

    /// Fixed seed for a reproducible random walk
    #[serde(default)]
    pub seed: Option<u64>,

    /// Probability that a single sample request fails
    #[serde(default)]
    pub failure_rate: Option<f64>,
}

fn default_api_port() -> u16 {
    8080
}

fn default_cadence_secs() -> u64 {
    5
}

fn default_sample_timeout_ms() -> u64 {
    2000
}

fn default_buffer_capacity() -> usize {
    30
}

fn default_alert_capacity() -> usize {
    5
}

fn default_metrics() -> Vec<String> {
    [
        MetricId::HeartRate,
        MetricId::BloodOxygen,
        MetricId::StepsCumulative,
    ]
    .iter()
    .map(|m| m.as_str().to_string())
    .collect()
}

fn default_devices() -> Vec<DeviceConfig> {
    vec![DeviceConfig {
        id: "demo".to_string(),
        metrics: default_metrics(),
        seed: None,
        failure_rate: None,
    }]
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cadence_secs: default_cadence_secs(),
            sample_timeout_ms: default_sample_timeout_ms(),
            buffer_capacity: default_buffer_capacity(),
            alert_capacity: default_alert_capacity(),
            thresholds: HashMap::new(),
            devices: default_devices(),
        }
    }
}

/// `VITALS_API_PORT`, `VITALS_THRESHOLDS__HEART_RATE__UPPER`, ...
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl MonitorConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("VITALS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path), environment())
    }

    /// Load from an optional file with `env` layered on top
    pub fn load_from(path: &Path, env: Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: MonitorConfig = config
            .try_deserialize()
            .context("Invalid monitor configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            bail!("At least one device must be configured");
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id.as_str()) {
                bail!("Duplicate device id '{}'", device.id);
            }
            device.metric_ids()?;
            if let Some(rate) = device.failure_rate {
                if !(0.0..=1.0).contains(&rate) {
                    bail!("Device '{}' failure_rate {} is outside 0..=1", device.id, rate);
                }
            }
        }

        self.session_config()?
            .validate()
            .context("Invalid session settings")?;
        Ok(())
    }

    /// Session settings shared by every device
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut thresholds = ThresholdTable::defaults();
        for (name, rule) in &self.thresholds {
            let metric: MetricId = name
                .parse()
                .with_context(|| format!("Invalid threshold override '{}'", name))?;
            thresholds.insert(metric, rule.clone());
        }

        Ok(SessionConfig {
            capacity: self.buffer_capacity,
            alert_capacity: self.alert_capacity,
            cadence: Duration::from_secs(self.cadence_secs),
            sample_timeout: Duration::from_millis(self.sample_timeout_ms),
            thresholds,
        })
    }

    /// One disconnected session per device, reporting to `events`
    pub fn build_registry(&self, events: mpsc::Sender<SessionEvent>) -> Result<SessionRegistry> {
        let session_config = self.session_config()?;
        let registry = SessionRegistry::new();

        for device in &self.devices {
            let session = MonitoringSession::builder(device.id.clone())
                .config(session_config.clone())
                .source(Arc::new(device.source()))
                .track_all(device.metric_ids()?)
                .events(events.clone())
                .build()
                .with_context(|| format!("Failed to build session for device '{}'", device.id))?;
            registry.insert(session);
        }

        Ok(registry)
    }
}

impl DeviceConfig {
    pub fn metric_ids(&self) -> Result<Vec<MetricId>> {
        self.metrics
            .iter()
            .map(|name| {
                name.parse::<MetricId>()
                    .with_context(|| format!("Device '{}' has an invalid metric", self.id))
            })
            .collect()
    }

    pub fn source(&self) -> SimulatedSource {
        let source = match self.seed {
            Some(seed) => SimulatedSource::seeded(seed),
            None => SimulatedSource::new(),
        };
        match self.failure_rate {
            Some(rate) => source.with_failure_rate(rate),
            None => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::Severity;
    use std::io::Write;

    fn no_env() -> Environment {
        environment().source(Some(config::Map::new()))
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = MonitorConfig::load_from(Path::new("/nonexistent/vitals.toml"), no_env()).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.cadence_secs, 5);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].id, "demo");
        assert_eq!(
            config.devices[0].metric_ids().unwrap(),
            vec![MetricId::HeartRate, MetricId::BloodOxygen, MetricId::StepsCumulative]
        );

        let session = config.session_config().unwrap();
        assert_eq!(session.capacity, 30);
        assert_eq!(session.alert_capacity, 5);
        assert_eq!(session.sample_timeout, Duration::from_secs(2));
        assert_eq!(session.thresholds, ThresholdTable::defaults());
    }

    #[test]
    fn test_file_with_devices_and_overrides() {
        let file = toml_file(
            r#"
            api_port = 9100
            cadence_secs = 1
            buffer_capacity = 10

            [thresholds.hr]
            lower = 40.0
            upper = 120.0
            severity = "warning"

            [[devices]]
            id = "ward-1"
            metrics = ["heart_rate", "spo2"]
            seed = 7

            [[devices]]
            id = "ward-2"
            failure_rate = 0.25
            "#,
        );

        let config = MonitorConfig::load_from(file.path(), no_env()).unwrap();
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].seed, Some(7));
        assert_eq!(config.devices[1].failure_rate, Some(0.25));
        assert_eq!(config.devices[1].metrics, default_metrics());

        let session = config.session_config().unwrap();
        assert_eq!(session.capacity, 10);
        assert_eq!(session.cadence, Duration::from_secs(1));
        let rule = session.thresholds.get(MetricId::HeartRate).unwrap();
        assert_eq!(rule.upper, Some(120.0));
        assert_eq!(rule.severity, Severity::Warning);
        // untouched metrics keep their canonical rule
        assert_eq!(
            session.thresholds.get(MetricId::BloodOxygen),
            ThresholdTable::defaults().get(MetricId::BloodOxygen)
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = toml_file("api_port = 9100\n");
        let config = MonitorConfig::load_from(
            file.path(),
            env(&[("VITALS_API_PORT", "9200"), ("VITALS_ALERT_CAPACITY", "8")]),
        )
        .unwrap();

        assert_eq!(config.api_port, 9200);
        assert_eq!(config.alert_capacity, 8);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let zero_capacity = toml_file("buffer_capacity = 0\n");
        assert!(MonitorConfig::load_from(zero_capacity.path(), no_env()).is_err());

        let unknown_metric = toml_file("[[devices]]\nid = \"a\"\nmetrics = [\"glucose\"]\n");
        assert!(MonitorConfig::load_from(unknown_metric.path(), no_env()).is_err());

        let duplicate = toml_file("[[devices]]\nid = \"a\"\n\n[[devices]]\nid = \"a\"\n");
        assert!(MonitorConfig::load_from(duplicate.path(), no_env()).is_err());

        let bad_rate = toml_file("[[devices]]\nid = \"a\"\nfailure_rate = 1.5\n");
        assert!(MonitorConfig::load_from(bad_rate.path(), no_env()).is_err());

        let inverted = toml_file(
            "[thresholds.heart_rate]\nlower = 100.0\nupper = 50.0\nseverity = \"critical\"\n",
        );
        assert!(MonitorConfig::load_from(inverted.path(), no_env()).is_err());
    }

    #[tokio::test]
    async fn test_build_registry() {
        let (tx, _rx) = mpsc::channel(8);
        let mut config = MonitorConfig::default();
        config.devices.push(DeviceConfig {
            id: "bed-2".to_string(),
            metrics: vec!["temp".to_string()],
            seed: Some(3),
            failure_rate: None,
        });

        let registry = config.build_registry(tx).unwrap();
        assert_eq!(registry.device_ids(), vec!["bed-2".to_string(), "demo".to_string()]);
        assert_eq!(
            registry.get("bed-2").unwrap().tracked_metrics(),
            vec![MetricId::BodyTemperature]
        );
    }
}
