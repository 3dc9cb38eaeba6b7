//! `GET /health`, `/health/ready`, `/health/live` (spec §6, §8 scenario 6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use super::state::AppState;

#[derive(Serialize)]
pub struct AdapterDetail {
    name: String,
    status: String,
    healthy: bool,
}

#[derive(Serialize)]
pub struct AdaptersCheck {
    status: &'static str,
    registered_count: usize,
    running_count: usize,
    details: Vec<AdapterDetail>,
}

#[derive(Serialize)]
pub struct HealthChecks {
    adapters: AdaptersCheck,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
    service: &'static str,
    version: &'static str,
    uptime: u64,
    checks: HealthChecks,
}

/// `GET /health`. 200 + `status:"healthy"` once at least one adapter is
/// connected; 503 + `status:"unhealthy"` otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let registry_status = state.registry.get_status().await;

    let details: Vec<AdapterDetail> = registry_status
        .instance_statuses
        .iter()
        .map(|s| AdapterDetail {
            name: s.name.clone(),
            status: format!("{:?}", s.status.status),
            healthy: matches!(s.status.health, crate::adapter::status::Health::Healthy),
        })
        .collect();

    let running_count = registry_status
        .instance_statuses
        .iter()
        .filter(|s| s.status.connectivity.connected)
        .count();

    let healthy = running_count > 0;

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: Utc::now().to_rfc3339(),
        service: state.service_name,
        version: state.version,
        uptime: state.uptime_seconds(),
        checks: HealthChecks {
            adapters: AdaptersCheck {
                status: if healthy { "pass" } else { "fail" },
                registered_count: registry_status.registered_adapters,
                running_count,
                details,
            },
        },
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

#[derive(Serialize)]
pub struct ReadyDetails {
    initialized: bool,
    running_adapters: Vec<String>,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    ready: bool,
    timestamp: String,
    details: ReadyDetails,
}

/// `GET /health/ready`.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let registry_status = state.registry.get_status().await;
    let running_adapters: Vec<String> = registry_status
        .instance_statuses
        .iter()
        .filter(|s| s.status.connectivity.connected)
        .map(|s| s.name.clone())
        .collect();

    let ready = !running_adapters.is_empty();
    let body = ReadyResponse {
        ready,
        timestamp: Utc::now().to_rfc3339(),
        details: ReadyDetails {
            initialized: registry_status.initialized,
            running_adapters,
        },
    };
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

#[derive(Serialize)]
pub struct LiveResponse {
    alive: bool,
    timestamp: String,
}

/// `GET /health/live`. Always 200 while the process can answer HTTP at all.
pub async fn live() -> Json<LiveResponse> {
    Json(LiveResponse {
        alive: true,
        timestamp: Utc::now().to_rfc3339(),
    })
}
