//! `GET /metrics` and `/metrics/json` (spec §6).

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use super::state::AppState;

/// `GET /metrics`. Renders whatever the process-wide Prometheus recorder has
/// accumulated via the `metrics` crate's macros.
pub async fn prometheus_text(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.prometheus.render();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[derive(Serialize)]
struct ServiceMetrics {
    name: &'static str,
    version: &'static str,
    uptime: u64,
    memory: MemoryMetrics,
    cpu: CpuMetrics,
}

#[derive(Serialize)]
struct MemoryMetrics {
    /// Resident set size is not sampled in-process here (spec §1
    /// "Non-goals": process-wide resource monitoring is an external
    /// collaborator); this reports allocator-independent zero until wired
    /// to a sampler.
    rss_bytes: u64,
}

#[derive(Serialize)]
struct CpuMetrics {
    percent: f64,
}

#[derive(Serialize)]
struct AdaptersMetrics {
    registered: usize,
    enabled: usize,
    running: usize,
    instances: Vec<InstanceMetricsEntry>,
}

#[derive(Serialize)]
struct InstanceMetricsEntry {
    name: String,
    status: String,
}

#[derive(Serialize)]
pub struct MetricsJsonResponse {
    service: ServiceMetrics,
    adapters: AdaptersMetrics,
    timestamp: String,
}

/// `GET /metrics/json`.
pub async fn metrics_json(State(state): State<AppState>) -> Json<MetricsJsonResponse> {
    let registry_status = state.registry.get_status().await;
    let instances = registry_status
        .instance_statuses
        .iter()
        .map(|s| InstanceMetricsEntry {
            name: s.name.clone(),
            status: format!("{:?}", s.status.status),
        })
        .collect();

    Json(MetricsJsonResponse {
        service: ServiceMetrics {
            name: state.service_name,
            version: state.version,
            uptime: state.uptime_seconds(),
            memory: MemoryMetrics { rss_bytes: 0 },
            cpu: CpuMetrics { percent: 0.0 },
        },
        adapters: AdaptersMetrics {
            registered: registry_status.registered_adapters,
            enabled: registry_status.enabled_adapters,
            running: registry_status.running_instances,
            instances,
        },
        timestamp: Utc::now().to_rfc3339(),
    })
}
