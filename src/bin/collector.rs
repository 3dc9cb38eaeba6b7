//! Binary entry point: wires the adapter registry to the HTTP control
//! plane and binds the Binance adapter as the one illustrative exchange
//! (spec §6, §1 "Non-goals" — config loading lives outside this crate; the
//! `MARKETFEED_*` env vars below are a minimal stand-in for it).

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use marketfeed_collector::adapter::binance::BinanceParser;
use marketfeed_collector::adapter::{Adapter, AdapterConfig};
use marketfeed_collector::connection::ConnectionConfig;
use marketfeed_collector::http::{self, AppState};
use marketfeed_collector::integration::{Integration, IntegrationConfig};
use marketfeed_collector::publisher::bus::HttpBusClient;
use marketfeed_collector::publisher::{Publisher, PublisherConfig};
use marketfeed_collector::registry::{AdapterRegistry, RegistryEntry};

#[tokio::main]
async fn main() -> marketfeed_collector::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder();
    let prometheus_handle = prometheus.handle();
    metrics::set_global_recorder(prometheus)
        .expect("failed to install Prometheus metrics recorder");

    let binance_endpoint = env::var("MARKETFEED_BINANCE_ENDPOINT")
        .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_owned());
    let bus_url =
        env::var("MARKETFEED_BUS_URL").unwrap_or_else(|_| "http://localhost:4000".to_owned());

    let registry = Arc::new(AdapterRegistry::new());

    let factory_endpoint = binance_endpoint.clone();
    let factory_bus_url = bus_url.clone();
    let factory: marketfeed_collector::registry::Factory = Arc::new(move || {
        let adapter_cfg = AdapterConfig {
            exchange: "binance".to_owned(),
            endpoint: factory_endpoint.clone(),
            connection: ConnectionConfig::default(),
            auth_token: None,
            health_window: 50,
        };
        let adapter = Adapter::initialize(BinanceParser, adapter_cfg);
        let bus = Arc::new(HttpBusClient::new(factory_bus_url.clone()));
        let publisher = Publisher::new(bus, PublisherConfig::default());
        let integration = Integration::new(adapter, publisher, IntegrationConfig::default());
        Ok(Box::new(integration) as Box<dyn marketfeed_collector::registry::Instance>)
    });

    registry
        .register(
            "binance",
            factory,
            RegistryEntry {
                name: "binance".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                description: "Binance combined-stream market-data adapter".to_owned(),
                supported_features: vec!["trade".into(), "ticker".into(), "kline".into(), "depth".into()],
                enabled: true,
                metadata: serde_json::json!({ "endpoint": binance_endpoint }),
            },
        )
        .expect("initial adapter registration must succeed");

    let failures = registry.start_auto_adapters(&["binance".to_owned()]).await;
    for failure in &failures {
        tracing::warn!(adapter = %failure.name, error = %failure.error, "auto-start failed");
    }

    let state = AppState::new(registry.clone(), prometheus_handle);
    let app = http::build_router(state);

    let port: u16 = env::var("MARKETFEED_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "control plane listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| marketfeed_collector::error::CollectorError::NetworkIssue(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| marketfeed_collector::error::CollectorError::NetworkIssue(e.to_string()))?;

    registry.destroy().await;
    Ok(())
}
