//! `GET/POST/PATCH /api/adapters...` (spec §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::state::AppState;
use crate::error::CollectorError;
use crate::integration::IntegrationMetrics;

#[derive(Serialize)]
pub struct ErrorBody {
    error: String,
}

/// Maps `CollectorError` onto the HTTP status the registry operation's
/// failure mode implies (spec §6's per-route error table, §7 "User-visible
/// failure").
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

impl From<CollectorError> for ApiError {
    fn from(err: CollectorError) -> Self {
        let status = match &err {
            CollectorError::NotFound(_) => StatusCode::NOT_FOUND,
            CollectorError::AlreadyRunning(_)
            | CollectorError::NotRunning(_)
            | CollectorError::InvalidConfig(_)
            | CollectorError::AlreadyRegistered(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.to_string())
    }
}

#[derive(Serialize)]
pub struct AdapterSummary {
    name: String,
    version: String,
    description: String,
    enabled: bool,
    running: bool,
    status: String,
    healthy: bool,
    metrics: Option<IntegrationMetrics>,
}

#[derive(Serialize)]
pub struct ListAdaptersResponse {
    total: usize,
    running: usize,
    adapters: Vec<AdapterSummary>,
}

async fn summarize(state: &AppState, entry: &crate::registry::RegistryEntry) -> AdapterSummary {
    let instance = state.registry.get_instance(&entry.name);
    let (running, status, healthy, metrics) = match &instance {
        Some(instance) => {
            let status = instance.status().await;
            (
                status.connectivity.connected,
                format!("{:?}", status.status),
                matches!(status.health, crate::adapter::status::Health::Healthy),
                Some(instance.metrics().await),
            )
        }
        None => (false, "IDLE".to_owned(), false, None),
    };

    AdapterSummary {
        name: entry.name.clone(),
        version: entry.version.clone(),
        description: entry.description.clone(),
        enabled: entry.enabled,
        running,
        status,
        healthy,
        metrics,
    }
}

/// `GET /api/adapters`.
pub async fn list_adapters(State(state): State<AppState>) -> Json<ListAdaptersResponse> {
    let entries = state.registry.list_entries();
    let mut adapters = Vec::with_capacity(entries.len());
    for entry in &entries {
        adapters.push(summarize(&state, entry).await);
    }
    let running = adapters.iter().filter(|a| a.running).count();
    Json(ListAdaptersResponse {
        total: adapters.len(),
        running,
        adapters,
    })
}

#[derive(Serialize)]
pub struct AdapterDetailResponse {
    name: String,
    version: String,
    description: String,
    enabled: bool,
    running: bool,
    status: String,
    healthy: bool,
    supported_features: Vec<String>,
    metadata: serde_json::Value,
    metrics: Option<IntegrationMetrics>,
}

/// `GET /api/adapters/:name`.
pub async fn get_adapter(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AdapterDetailResponse>, ApiError> {
    let entry = state
        .registry
        .get_registry_entry(&name)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("adapter not found: {name}")))?;

    let summary = summarize(&state, &entry).await;
    Ok(Json(AdapterDetailResponse {
        name: summary.name,
        version: summary.version,
        description: summary.description,
        enabled: summary.enabled,
        running: summary.running,
        status: summary.status,
        healthy: summary.healthy,
        supported_features: entry.supported_features,
        metadata: entry.metadata,
        metrics: summary.metrics,
    }))
}

#[derive(Serialize)]
pub struct ActionResponse {
    success: bool,
    message: String,
}

/// Request body for `POST /api/adapters/:name/start`. The per-instance
/// connection/publisher configuration is fixed at `register()` time; this
/// body is accepted and validated against the route contract but does not
/// currently override it (see `DESIGN.md`).
#[derive(Deserialize)]
pub struct StartAdapterRequest {
    #[serde(default)]
    pub topic_prefix: Option<String>,
}

/// `POST /api/adapters/:name/start`.
pub async fn start_adapter(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<StartAdapterRequest>>,
) -> Result<Json<ActionResponse>, ApiError> {
    let _ = body;
    if state.registry.get_instance(&name).is_none() {
        state.registry.create_instance(&name)?;
    }
    state.registry.start_instance(&name).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("adapter '{name}' started"),
    }))
}

/// `POST /api/adapters/:name/stop`.
pub async fn stop_adapter(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.registry.stop_instance(&name).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("adapter '{name}' stopped"),
    }))
}

#[derive(Serialize)]
pub struct RestartResponse {
    success: bool,
    message: String,
    previous_metrics: Option<IntegrationMetrics>,
}

/// `POST /api/adapters/:name/restart`.
pub async fn restart_adapter(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RestartResponse>, ApiError> {
    let instance = state
        .registry
        .get_instance(&name)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("adapter not found: {name}")))?;

    let previous_metrics = Some(instance.metrics().await);
    state.registry.stop_instance(&name).await?;
    state.registry.start_instance(&name).await?;

    Ok(Json(RestartResponse {
        success: true,
        message: format!("adapter '{name}' restarted"),
        previous_metrics,
    }))
}

#[derive(Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

/// `PATCH /api/adapters/:name/enabled`.
pub async fn set_adapter_enabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SetEnabledRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.registry.set_adapter_enabled(&name, body.enabled)?;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("adapter '{name}' enabled set to {}", body.enabled),
    }))
}
