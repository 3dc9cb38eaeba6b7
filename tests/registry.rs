//! Registry lifecycle and directory invariants (spec §4.5, §8 invariant #8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use marketfeed_collector::adapter::status::{
    AdapterLifecycle, AdapterStatus, Connectivity, Health, Performance,
};
use marketfeed_collector::error::{CollectorError, Result};
use marketfeed_collector::integration::IntegrationMetrics;
use marketfeed_collector::registry::{AdapterRegistry, Instance, RegistryEntry};

/// A trivial `Instance` that never touches the network, for exercising the
/// registry's own bookkeeping in isolation.
struct FakeInstance {
    running: AtomicBool,
}

impl FakeInstance {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Instance for FakeInstance {
    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning("ex".to_owned()));
        }
        Ok(())
    }
    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(CollectorError::NotRunning("ex".to_owned()));
        }
        Ok(())
    }
    async fn destroy(&self) {}
    async fn status(&self) -> AdapterStatus {
        AdapterStatus {
            status: AdapterLifecycle::Connected,
            health: Health::Healthy,
            connectivity: Connectivity {
                connected: self.running.load(Ordering::SeqCst),
                reconnecting: false,
            },
            performance: Performance {
                error_rate: 0.0,
                average_latency: 0.0,
            },
        }
    }
    async fn metrics(&self) -> IntegrationMetrics {
        IntegrationMetrics::default()
    }
}

fn entry(name: &str) -> RegistryEntry {
    RegistryEntry {
        name: name.to_owned(),
        version: "0.1.0".to_owned(),
        description: "fake adapter".to_owned(),
        supported_features: vec!["trade".into()],
        enabled: true,
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn register_is_idempotent_for_identical_entries() {
    let registry = AdapterRegistry::new();
    let factory = Arc::new(|| Ok(Box::new(FakeInstance::new()) as Box<dyn Instance>));
    registry
        .register("ex", factory.clone(), entry("ex"))
        .unwrap();
    registry.register("ex", factory, entry("ex")).unwrap();
    assert!(registry.has_adapter("ex"));
}

#[tokio::test]
async fn register_with_different_entry_fails() {
    let registry = AdapterRegistry::new();
    let factory = Arc::new(|| Ok(Box::new(FakeInstance::new()) as Box<dyn Instance>));
    registry
        .register("ex", factory.clone(), entry("ex"))
        .unwrap();

    let mut different = entry("ex");
    different.description = "a different adapter".to_owned();
    let err = registry.register("ex", factory, different).unwrap_err();
    assert!(matches!(err, CollectorError::AlreadyRegistered(_)));
}

#[tokio::test]
async fn exactly_one_instance_per_name() {
    let registry = AdapterRegistry::new();
    let factory = Arc::new(|| Ok(Box::new(FakeInstance::new()) as Box<dyn Instance>));
    registry.register("ex", factory, entry("ex")).unwrap();

    assert!(registry.get_instance("ex").is_none());
    registry.create_instance("ex").unwrap();
    assert!(registry.get_instance("ex").is_some());

    let err = registry.create_instance("ex").unwrap_err();
    assert!(matches!(err, CollectorError::AlreadyRunning(_)));
}

#[tokio::test]
async fn unregister_fails_while_instance_is_live() {
    let registry = AdapterRegistry::new();
    let factory = Arc::new(|| Ok(Box::new(FakeInstance::new()) as Box<dyn Instance>));
    registry.register("ex", factory, entry("ex")).unwrap();
    registry.create_instance("ex").unwrap();

    let err = registry.unregister("ex").unwrap_err();
    assert!(matches!(err, CollectorError::AlreadyRunning(_)));

    registry.destroy_instance("ex").await.unwrap();
    registry.unregister("ex").unwrap();
    assert!(!registry.has_adapter("ex"));
}

#[tokio::test]
async fn start_stop_instance_round_trip() {
    let registry = AdapterRegistry::new();
    let factory = Arc::new(|| Ok(Box::new(FakeInstance::new()) as Box<dyn Instance>));
    registry.register("ex", factory, entry("ex")).unwrap();
    registry.create_instance("ex").unwrap();

    registry.start_instance("ex").await.unwrap();
    let status = registry.get_status().await;
    assert_eq!(status.running_instances, 1);

    let err = registry.start_instance("ex").await.unwrap_err();
    assert!(matches!(err, CollectorError::AlreadyRunning(_)));

    registry.stop_instance("ex").await.unwrap();
    let err = registry.stop_instance("ex").await.unwrap_err();
    assert!(matches!(err, CollectorError::NotRunning(_)));

    registry.destroy_instance("ex").await.unwrap();
    let err = registry.stop_instance("ex").await.unwrap_err();
    assert!(matches!(err, CollectorError::NotFound(_)));
}

#[tokio::test]
async fn set_adapter_enabled_does_not_touch_live_instances() {
    let registry = AdapterRegistry::new();
    let factory = Arc::new(|| Ok(Box::new(FakeInstance::new()) as Box<dyn Instance>));
    registry.register("ex", factory, entry("ex")).unwrap();
    registry.create_instance("ex").unwrap();
    registry.start_instance("ex").await.unwrap();

    registry.set_adapter_enabled("ex", false).unwrap();
    assert!(!registry.get_registry_entry("ex").unwrap().enabled);
    assert!(registry.get_instance("ex").is_some());
}
