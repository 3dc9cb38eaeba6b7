//! The process-wide adapter directory (spec §4.5, component E "Adapter Registry").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::adapter::status::AdapterStatus;
use crate::error::{CollectorError, Result};
use crate::integration::IntegrationMetrics;

/// Type-erased handle to a running `Integration<P>`, so the registry can
/// hold adapters built on different [`crate::adapter::MessageParser`]
/// implementations behind one map (spec §3 "Integration instance").
#[async_trait]
pub trait Instance: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn destroy(&self);
    async fn status(&self) -> AdapterStatus;
    async fn metrics(&self) -> IntegrationMetrics;
}

#[async_trait]
impl<P: crate::adapter::MessageParser> Instance for crate::integration::Integration<P> {
    async fn start(&self) -> Result<()> {
        crate::integration::Integration::start(self).await
    }
    async fn stop(&self) -> Result<()> {
        crate::integration::Integration::stop(self).await
    }
    async fn destroy(&self) {
        crate::integration::Integration::destroy(self).await
    }
    async fn status(&self) -> AdapterStatus {
        crate::integration::Integration::status(self).await
    }
    async fn metrics(&self) -> IntegrationMetrics {
        crate::integration::Integration::metrics(self).await
    }
}

/// Builds a fresh, unstarted [`Instance`] for one registry entry.
pub type Factory = Arc<dyn Fn() -> Result<Box<dyn Instance>> + Send + Sync>;

/// Public directory entry (spec §3 `RegistryEntry`); the factory itself is
/// kept out of band since it is not a meaningful externally-visible field.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub name: String,
    pub version: String,
    pub description: String,
    pub supported_features: Vec<String>,
    pub enabled: bool,
    pub metadata: serde_json::Value,
}

struct FactoryBinding {
    entry: RegistryEntry,
    factory: Factory,
}

/// Aggregate snapshot returned by `getStatus()` (spec §4.5).
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub initialized: bool,
    pub registered_adapters: usize,
    pub enabled_adapters: usize,
    pub running_instances: usize,
    pub instance_statuses: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub status: AdapterStatus,
}

/// Per-instance or per-name failure collected by `startAutoAdapters` (spec §4.5).
#[derive(Debug, Clone)]
pub struct AutoStartFailure {
    pub name: String,
    pub error: String,
}

/// Events the registry re-emits (spec §4.5 "Events").
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    InstanceCreated { name: String },
    InstanceStarted { name: String },
    InstanceStopped { name: String },
    InstanceDestroyed { name: String },
    InstanceStatusChange { name: String },
}

const REGISTRY_EVENT_CAPACITY: usize = 512;

/// Process-wide directory of factory bindings and live integration
/// instances (spec §4.5). Reads and writes on distinct names proceed in
/// parallel; the `DashMap` gives per-shard locking so `getStatus`/
/// `listEntries` observe a consistent-enough snapshot without blocking
/// concurrent mutation of unrelated entries (spec §5 "Concurrency").
pub struct AdapterRegistry {
    factories: DashMap<String, FactoryBinding>,
    instances: DashMap<String, Arc<dyn Instance>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(REGISTRY_EVENT_CAPACITY);
        Self {
            factories: DashMap::new(),
            instances: DashMap::new(),
            events: tx,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register a factory binding. Idempotent if `entry` is identical to an
    /// existing registration; fails `AlreadyRegistered` if the name is
    /// reused with a different entry (spec §4.5 `register`).
    pub fn register(&self, name: &str, factory: Factory, entry: RegistryEntry) -> Result<()> {
        if let Some(existing) = self.factories.get(name) {
            if existing.entry.name == entry.name
                && existing.entry.version == entry.version
                && existing.entry.description == entry.description
                && existing.entry.supported_features == entry.supported_features
                && existing.entry.metadata == entry.metadata
            {
                return Ok(());
            }
            return Err(CollectorError::AlreadyRegistered(name.to_owned()));
        }
        self.factories
            .insert(name.to_owned(), FactoryBinding { entry, factory });
        Ok(())
    }

    /// Unregister `name`; fails if a live instance still exists.
    pub fn unregister(&self, name: &str) -> Result<()> {
        if self.instances.contains_key(name) {
            return Err(CollectorError::AlreadyRunning(name.to_owned()));
        }
        self.factories
            .remove(name)
            .ok_or_else(|| CollectorError::NotFound(name.to_owned()))?;
        Ok(())
    }

    pub fn has_adapter(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn get_registry_entry(&self, name: &str) -> Option<RegistryEntry> {
        self.factories.get(name).map(|b| b.entry.clone())
    }

    /// Snapshot of all registered entries, safe to call during concurrent
    /// mutation elsewhere in the map (spec §4.5 "snapshot semantics").
    pub fn list_entries(&self) -> Vec<RegistryEntry> {
        self.factories.iter().map(|b| b.entry.clone()).collect()
    }

    /// Toggle `enabled` without starting or stopping any live instance.
    pub fn set_adapter_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut binding = self
            .factories
            .get_mut(name)
            .ok_or_else(|| CollectorError::NotFound(name.to_owned()))?;
        binding.entry.enabled = enabled;
        Ok(())
    }

    /// Construct an instance from `name`'s factory (spec §4.5 `createInstance`).
    pub fn create_instance(&self, name: &str) -> Result<()> {
        if self.instances.contains_key(name) {
            return Err(CollectorError::AlreadyRunning(name.to_owned()));
        }
        let binding = self
            .factories
            .get(name)
            .ok_or_else(|| CollectorError::NotFound(name.to_owned()))?;
        let instance = (binding.factory)()?;
        drop(binding);
        self.instances.insert(name.to_owned(), Arc::from(instance));
        let _ = self.events.send(RegistryEvent::InstanceCreated {
            name: name.to_owned(),
        });
        Ok(())
    }

    fn get_instance_arc(&self, name: &str) -> Result<Arc<dyn Instance>> {
        self.instances
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| CollectorError::NotFound(name.to_owned()))
    }

    /// Start an already-created instance (spec §4.5 `startInstance`).
    pub async fn start_instance(&self, name: &str) -> Result<()> {
        let instance = self.get_instance_arc(name)?;
        instance.start().await?;
        let _ = self.events.send(RegistryEvent::InstanceStarted {
            name: name.to_owned(),
        });
        let _ = self.events.send(RegistryEvent::InstanceStatusChange {
            name: name.to_owned(),
        });
        Ok(())
    }

    /// Stop a running instance (spec §4.5 `stopInstance`).
    pub async fn stop_instance(&self, name: &str) -> Result<()> {
        let instance = self.get_instance_arc(name)?;
        instance.stop().await?;
        let _ = self.events.send(RegistryEvent::InstanceStopped {
            name: name.to_owned(),
        });
        let _ = self.events.send(RegistryEvent::InstanceStatusChange {
            name: name.to_owned(),
        });
        Ok(())
    }

    /// Remove an instance; safe after `stop` (spec §4.5 `destroyInstance`).
    pub async fn destroy_instance(&self, name: &str) -> Result<()> {
        let (_, instance) = self
            .instances
            .remove(name)
            .ok_or_else(|| CollectorError::NotFound(name.to_owned()))?;
        instance.destroy().await;
        let _ = self.events.send(RegistryEvent::InstanceDestroyed {
            name: name.to_owned(),
        });
        Ok(())
    }

    pub fn get_instance(&self, name: &str) -> Option<Arc<dyn Instance>> {
        self.instances.get(name).map(|e| e.value().clone())
    }

    /// Aggregate status over every registered entry and live instance (spec
    /// §4.5 `getStatus`).
    pub async fn get_status(&self) -> RegistryStatus {
        let registered = self.factories.len();
        let enabled = self.factories.iter().filter(|b| b.entry.enabled).count();

        let names: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        let mut instance_statuses = Vec::with_capacity(names.len());
        for name in names {
            if let Some(instance) = self.get_instance(&name) {
                instance_statuses.push(InstanceStatus {
                    name,
                    status: instance.status().await,
                });
            }
        }

        RegistryStatus {
            initialized: true,
            registered_adapters: registered,
            enabled_adapters: enabled,
            running_instances: self.instances.len(),
            instance_statuses,
        }
    }

    /// Create and start an instance for every `enabled` entry listed in
    /// `configured`, in parallel; per-instance failures are collected but
    /// never abort sibling instances (spec §4.5 `startAutoAdapters`).
    pub async fn start_auto_adapters(&self, configured: &[String]) -> Vec<AutoStartFailure> {
        let enabled_names: Vec<String> = self
            .factories
            .iter()
            .filter(|b| b.entry.enabled && configured.contains(b.key()))
            .map(|b| b.key().clone())
            .collect();

        let results = futures_util::future::join_all(enabled_names.iter().map(|name| async move {
            let outcome: Result<()> = async {
                self.create_instance(name)?;
                self.start_instance(name).await
            }
            .await;
            (name.clone(), outcome)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(name, outcome)| match outcome {
                Ok(()) => None,
                Err(e) => Some(AutoStartFailure {
                    name,
                    error: e.to_string(),
                }),
            })
            .collect()
    }

    /// Stop every currently-running instance; failures are collected, not propagated.
    pub async fn stop_all_instances(&self) -> HashMap<String, String> {
        let names: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        let mut failures = HashMap::new();
        for name in names {
            if let Err(e) = self.stop_instance(&name).await {
                failures.insert(name, e.to_string());
            }
        }
        failures
    }

    /// Reset all global state: stop and destroy every instance, clear the
    /// factory map (spec §9 "Global mutable state... expose an explicit
    /// `destroy()` that resets global state").
    pub async fn destroy(&self) {
        let names: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for name in names {
            let _ = self.stop_instance(&name).await;
            let _ = self.destroy_instance(&name).await;
        }
        self.factories.clear();
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
