//! Shared state handed to every axum handler (spec §6).

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::registry::AdapterRegistry;

/// Process-wide handle shared across all HTTP handlers. Cheap to clone —
/// every field is an `Arc` or `Copy` value, matching `axum`'s
/// `Clone`-per-request state convention.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AdapterRegistry>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
    pub service_name: &'static str,
    pub version: &'static str,
}

impl AppState {
    pub fn new(registry: Arc<AdapterRegistry>, prometheus: PrometheusHandle) -> Self {
        Self {
            registry,
            prometheus,
            started_at: Instant::now(),
            service_name: "marketfeed-collector",
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
