//! HTTP API for health checks, Prometheus metrics and dashboard reads

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use monitor_lib::{
    collector::{CollectorService, CollectorStats, CollectorStatus},
    health::{ComponentStatus, HealthRegistry},
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Upper bound on `limit` for the recent metrics endpoint
const MAX_RECENT_LIMIT: usize = 10_000;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub service: Arc<CollectorService>,
}

impl AppState {
    pub fn new(service: Arc<CollectorService>) -> Self {
        Self {
            health_registry: service.health().clone(),
            service,
        }
    }
}

/// Collector status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub collector: CollectorStatus,
    pub stats: CollectorStats,
    pub window_snapshots: usize,
    pub detector_fitted: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still collecting
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
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let service = &state.service;
    Json(StatusResponse {
        collector: service.status(),
        stats: service.stats(),
        window_snapshots: service.dashboard().window_len(),
        detector_fitted: service.detector().is_fitted(),
    })
}

/// Snapshots in the rolling window, oldest first; `limit` keeps the newest k
async fn recent_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    let dashboard = state.service.dashboard();
    let snapshots = match query.limit {
        Some(limit) => dashboard.recent_metrics_limited(limit.min(MAX_RECENT_LIMIT)),
        None => dashboard.recent_metrics(),
    };
    Json(snapshots)
}

async fn recent_anomalies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.dashboard().recent_anomalies())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/metrics/recent", get(recent_metrics))
        .route("/api/v1/anomalies/recent", get(recent_anomalies))
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
