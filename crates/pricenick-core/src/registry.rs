//! Integration registry: discovery, enable/disable, initialization and health.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::IntegrationsFile;
use crate::error::{ConfigError, PriceError, Result};
use crate::fetch::FetchReport;
use crate::integration::{Integration, IntegrationDef};
use crate::provider::{HealthStatus, ProviderDescriptor, ProviderHealth};

/// What the fetch orchestrator needs for one provider: the descriptor as it
/// was when the cycle started, and the integration to call.
#[derive(Clone)]
pub struct ActiveIntegration {
    pub descriptor: ProviderDescriptor,
    pub integration: Arc<dyn Integration>,
}

struct Entry {
    descriptor: ProviderDescriptor,
    enabled: AtomicBool,
    integration: Arc<dyn Integration>,
    health: RwLock<HealthStatus>,
}

impl Entry {
    fn descriptor(&self) -> ProviderDescriptor {
        let mut d = self.descriptor.clone();
        d.enabled = self.enabled.load(Ordering::SeqCst);
        d
    }

    fn health(&self) -> HealthStatus {
        self.health
            .read()
            .map(|h| h.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_health(&self, status: HealthStatus) {
        match self.health.write() {
            Ok(mut h) => *h = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }
}

#[derive(Default)]
pub struct IntegrationRegistry {
    entries: Vec<Entry>,
    excluded: Vec<ConfigError>,
    init_lock: tokio::sync::Mutex<()>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk the registration table in order and build every integration whose
    /// configuration is present and valid. Invalid ones are logged and skipped.
    pub fn discover(file: &IntegrationsFile, defs: &[IntegrationDef]) -> Self {
        let mut registry = Self::new();

        for def in defs {
            let built = file
                .descriptor(def.key)
                .and_then(|d| (def.build)(&d).map(|i| (d, i)));
            let outcome = built.and_then(|(d, i)| registry.register(d, i));
            if let Err(e) = outcome {
                warn!(provider = def.key, error = %e, "excluding integration");
                registry.excluded.push(e);
            }
        }

        for key in file.integration.keys() {
            if !defs.iter().any(|d| d.key == key) {
                warn!(provider = %key, "configured but no integration registered under this key");
            }
        }

        info!(
            discovered = registry.entries.len(),
            excluded = registry.excluded.len(),
            "integration discovery finished"
        );
        registry
    }

    /// Add an integration explicitly. Keys must be unique.
    pub fn register(
        &mut self,
        descriptor: ProviderDescriptor,
        integration: Arc<dyn Integration>,
    ) -> std::result::Result<(), ConfigError> {
        if self.entries.iter().any(|e| e.descriptor.key == descriptor.key) {
            return Err(ConfigError::Invalid {
                key: descriptor.key.clone(),
                field: "key".into(),
                reason: "registered twice".into(),
            });
        }
        self.entries.push(Entry {
            enabled: AtomicBool::new(descriptor.enabled),
            descriptor,
            integration,
            health: RwLock::new(HealthStatus::Uninitialized),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every discovered descriptor, enabled or not, in discovery order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.entries.iter().map(Entry::descriptor).collect()
    }

    /// Configuration errors that kept integrations out of the registry.
    pub fn excluded(&self) -> &[ConfigError] {
        &self.excluded
    }

    pub fn set_enabled(&self, key: &str, enabled: bool) -> Result<()> {
        let entry = self.entry(key)?;
        entry.enabled.store(enabled, Ordering::SeqCst);
        info!(provider = key, enabled, "provider toggled");
        Ok(())
    }

    /// Enabled descriptors in discovery order.
    pub fn active_providers(&self) -> Vec<ProviderDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.enabled.load(Ordering::SeqCst))
            .map(Entry::descriptor)
            .collect()
    }

    /// Enabled and successfully initialized integrations, frozen for one cycle.
    pub fn snapshot(&self) -> Vec<ActiveIntegration> {
        self.entries
            .iter()
            .filter(|e| e.enabled.load(Ordering::SeqCst) && e.health().is_available())
            .map(|e| ActiveIntegration {
                descriptor: e.descriptor(),
                integration: Arc::clone(&e.integration),
            })
            .collect()
    }

    /// Run `initialize()` for every enabled integration not initialized yet.
    pub async fn ensure_initialized(&self) {
        let _guard = self.init_lock.lock().await;

        let pending: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| {
                e.enabled.load(Ordering::SeqCst) && e.health() == HealthStatus::Uninitialized
            })
            .collect();

        let handles: Vec<_> = pending
            .iter()
            .map(|e| {
                let integration = Arc::clone(&e.integration);
                let timeout = e.descriptor.timeout;
                tokio::spawn(initialize_one(integration, timeout))
            })
            .collect();

        for (entry, handle) in pending.into_iter().zip(handles) {
            let status = match handle.await {
                Ok(status) => status,
                Err(e) => HealthStatus::Unavailable(format!("initialize panicked: {e}")),
            };
            if let HealthStatus::Unavailable(reason) = &status {
                warn!(provider = %entry.descriptor.key, reason = %reason, "initialization failed");
            }
            entry.set_health(status);
        }
    }

    /// Re-run `initialize()` for one integration. Returns whether it is now available.
    pub async fn reload(&self, key: &str) -> Result<bool> {
        let entry = self.entry(key)?;
        let _guard = self.init_lock.lock().await;

        let handle = tokio::spawn(initialize_one(
            Arc::clone(&entry.integration),
            entry.descriptor.timeout,
        ));
        let status = handle
            .await
            .unwrap_or_else(|e| HealthStatus::Unavailable(format!("initialize panicked: {e}")));
        let available = status.is_available();
        info!(provider = key, available, "provider reloaded");
        entry.set_health(status);
        Ok(available)
    }

    /// Fold one cycle's per-provider outcomes into health.
    pub fn record_fetch(&self, report: &FetchReport) {
        for (key, result) in report.iter() {
            let Some(entry) = self.entries.iter().find(|e| e.descriptor.key == key) else {
                continue;
            };
            // A reload may have marked it unavailable while the cycle ran.
            if !entry.health().is_available() {
                continue;
            }
            entry.set_health(match result {
                Ok(_) => HealthStatus::Available,
                Err(e) => HealthStatus::Failed(e.to_string()),
            });
        }
    }

    /// Current health of every discovered provider.
    pub fn health(&self) -> Vec<ProviderHealth> {
        self.entries
            .iter()
            .map(|e| ProviderHealth {
                key: e.descriptor.key.clone(),
                display_name: e.descriptor.display_name.clone(),
                status: if e.enabled.load(Ordering::SeqCst) {
                    e.health()
                } else {
                    HealthStatus::Disabled
                },
            })
            .collect()
    }

    fn entry(&self, key: &str) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.descriptor.key == key)
            .ok_or_else(|| PriceError::UnknownProvider(key.to_string()))
    }
}

async fn initialize_one(integration: Arc<dyn Integration>, timeout: Duration) -> HealthStatus {
    match tokio::time::timeout(timeout, integration.initialize()).await {
        Ok(true) => HealthStatus::Available,
        Ok(false) => HealthStatus::Unavailable("initialize returned false".into()),
        Err(_) => HealthStatus::Unavailable(format!(
            "initialize timed out after {}s",
            timeout.as_secs_f64()
        )),
    }
}
