//! The control-plane HTTP surface (spec §4, §6, component F "Control-plane
//! surface"). Route wiring only — every handler consumes exclusively the
//! [`crate::registry::AdapterRegistry`] public contract, per spec §1's
//! scoping of F as "trivial glue" over E.
//!
//! Grounded on `alphapulse-api-server`'s `axum::Router` + `CorsLayer` +
//! `TraceLayer` + Prometheus-recorder bootstrap (`main.rs`, `handlers/health.rs`).

pub mod adapters;
pub mod health;
pub mod metrics;
pub mod state;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the full control-plane router (spec §6's exact route table).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::prometheus_text))
        .route("/metrics/json", get(metrics::metrics_json))
        .route("/api/adapters", get(adapters::list_adapters))
        .route("/api/adapters/:name", get(adapters::get_adapter))
        .route("/api/adapters/:name/start", post(adapters::start_adapter))
        .route("/api/adapters/:name/stop", post(adapters::stop_adapter))
        .route(
            "/api/adapters/:name/restart",
            post(adapters::restart_adapter),
        )
        .route(
            "/api/adapters/:name/enabled",
            patch(adapters::set_adapter_enabled),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
