//! HTTP API for health checks, Prometheus metrics and device sessions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use monitor_lib::{
    anomaly::DEFAULT_ALERT_CAPACITY,
    health::{ComponentStatus, HealthRegistry},
    models::UnknownMetric,
    AnomalyEvent, BufferError, MetricId, MetricStatistics, MonitorMetrics, MonitoringSession,
    SessionError, SessionRegistry, SessionStatus, SessionSummary,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            registry,
            health_registry,
            metrics,
        }
    }

    fn session(&self, device_id: &str) -> Result<MonitoringSession, ApiError> {
        self.registry
            .get(device_id)
            .ok_or_else(|| ApiError::DeviceNotFound(device_id.to_string()))
    }
}

/// Errors returned by the device endpoints
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error(transparent)]
    UnknownMetric(#[from] UnknownMetric),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// JSON body of an error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::DeviceNotFound(_) => (StatusCode::NOT_FOUND, "device_not_found"),
            ApiError::UnknownMetric(_) => (StatusCode::NOT_FOUND, "unknown_metric"),
            ApiError::Session(SessionError::MetricNotTracked(_)) => {
                (StatusCode::NOT_FOUND, "metric_not_tracked")
            }
            ApiError::Session(SessionError::Buffer(BufferError::Empty(_))) => {
                (StatusCode::CONFLICT, "no_samples")
            }
            ApiError::Session(SessionError::AlreadyConnected | SessionError::NotConnected) => {
                (StatusCode::CONFLICT, "invalid_state")
            }
            ApiError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Outcome of a connect, disconnect or reset request
#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub device_id: String,
    pub status: SessionStatus,
    /// False when the request was a no-op
    pub changed: bool,
}

impl TransitionResponse {
    fn from_outcome(session: &MonitoringSession, outcome: Result<(), SessionError>) -> Result<Self, ApiError> {
        let changed = match outcome {
            Ok(()) => true,
            Err(e) if e.is_benign() => false,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            device_id: session.device_id().to_string(),
            status: session.status(),
            changed,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.summaries())
}

async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    Ok(Json(state.session(&device_id)?.summary()))
}

async fn connect_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let session = state.session(&device_id)?;
    let outcome = session.connect();
    Ok(Json(TransitionResponse::from_outcome(&session, outcome)?))
}

async fn disconnect_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let session = state.session(&device_id)?;
    let outcome = session.disconnect();
    Ok(Json(TransitionResponse::from_outcome(&session, outcome)?))
}

async fn reset_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let session = state.session(&device_id)?;
    session.reset();
    info!(device = %device_id, "Session reset via API");
    Ok(Json(TransitionResponse::from_outcome(&session, Ok(()))?))
}

async fn device_statistics(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<MetricStatistics>>, ApiError> {
    Ok(Json(state.session(&device_id)?.all_statistics()))
}

async fn metric_statistics(
    State(state): State<Arc<AppState>>,
    Path((device_id, metric)): Path<(String, String)>,
) -> Result<Json<MetricStatistics>, ApiError> {
    let session = state.session(&device_id)?;
    let metric: MetricId = metric.parse()?;
    Ok(Json(session.statistics(metric)?))
}

async fn device_alerts(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Vec<AnomalyEvent>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_CAPACITY);
    Ok(Json(state.session(&device_id)?.recent_alerts(limit)))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/devices/:id", get(get_device))
        .route("/api/v1/devices/:id/connect", post(connect_device))
        .route("/api/v1/devices/:id/disconnect", post(disconnect_device))
        .route("/api/v1/devices/:id/reset", post(reset_device))
        .route("/api/v1/devices/:id/statistics", get(device_statistics))
        .route("/api/v1/devices/:id/statistics/:metric", get(metric_statistics))
        .route("/api/v1/devices/:id/alerts", get(device_alerts))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
