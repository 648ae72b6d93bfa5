//! API client for communicating with the vitals monitor daemon

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the monitor's device endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(error) => anyhow::bail!("{} ({}, {})", error.error, status, error.code),
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }

    /// Build an endpoint URL under `api/v1/devices`. Each segment is
    /// percent-encoded, so IDs containing `/`, `?` or `#` stay one segment.
    fn devices_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["api", "v1", "devices"])
            .extend(segments);
        Ok(url)
    }

    pub async fn devices(&self) -> Result<Vec<DeviceSummary>> {
        self.get(self.devices_url(&[])?).await
    }

    pub async fn device(&self, device: &str) -> Result<DeviceSummary> {
        self.get(self.devices_url(&[device])?).await
    }

    pub async fn connect(&self, device: &str) -> Result<TransitionResponse> {
        self.post(self.devices_url(&[device, "connect"])?).await
    }

    pub async fn disconnect(&self, device: &str) -> Result<TransitionResponse> {
        self.post(self.devices_url(&[device, "disconnect"])?).await
    }

    pub async fn reset(&self, device: &str) -> Result<TransitionResponse> {
        self.post(self.devices_url(&[device, "reset"])?).await
    }

    pub async fn statistics(&self, device: &str) -> Result<Vec<MetricStatistics>> {
        self.get(self.devices_url(&[device, "statistics"])?).await
    }

    pub async fn metric_statistics(&self, device: &str, metric: &str) -> Result<MetricStatistics> {
        self.get(self.devices_url(&[device, "statistics", metric])?)
            .await
    }

    pub async fn alerts(&self, device: &str, limit: usize) -> Result<Vec<Alert>> {
        let mut url = self.devices_url(&[device, "alerts"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get(url).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub status: String,
    pub tracked_metrics: Vec<String>,
    pub alert_count: usize,
    pub transient_errors: u64,
    pub ticks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub device_id: String,
    pub status: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub metric: String,
    pub unit: String,
    pub current: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
    pub last_updated: String,
    pub transient_errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub metric: String,
    pub value: f64,
    pub timestamp: String,
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
