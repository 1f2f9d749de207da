//! Adapter registry built once from configuration.
//!
//! Each configured name resolves to a factory. A name without a factory, or a
//! factory that fails, is logged and skipped so one broken integration never
//! keeps the others from loading. After initialization the adapter list is
//! immutable.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    adapter::{AdapterHealth, AdapterHealthReport, IntegrationAdapter},
    adapters::{MockBadgeAdapter, PayrollAdapter, PayrollConfig},
    error::{DeliveryError, Result},
};

/// Constructor for one named adapter.
pub type AdapterFactory =
    Arc<dyn Fn(&AdapterSettings) -> Result<Arc<dyn IntegrationAdapter>> + Send + Sync>;

/// Settings consumed by adapter factories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSettings {
    /// Names of the integrations to load, in dispatch order.
    pub active: Vec<String>,
    /// Base URL for the payroll adapter.
    pub payroll_base_url: String,
    /// Time budget for one adapter call.
    pub adapter_timeout: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            active: vec![PayrollAdapter::NAME.to_string(), MockBadgeAdapter::NAME.to_string()],
            payroll_base_url: PayrollConfig::default().base_url,
            adapter_timeout: Duration::from_millis(crate::DEFAULT_ADAPTER_TIMEOUT_MS),
        }
    }
}

/// Registry of active downstream integrations.
pub struct AdapterRegistry {
    settings: AdapterSettings,
    factories: HashMap<String, AdapterFactory>,
    adapters: OnceLock<Vec<Arc<dyn IntegrationAdapter>>>,
}

impl AdapterRegistry {
    /// Creates a registry with no factories.
    pub fn new(settings: AdapterSettings) -> Self {
        Self { settings, factories: HashMap::new(), adapters: OnceLock::new() }
    }

    /// Creates a registry that knows the payroll and badge adapters.
    pub fn with_builtin_adapters(settings: AdapterSettings) -> Self {
        let mut registry = Self::new(settings);

        registry.register_factory(PayrollAdapter::NAME, |settings| {
            let adapter = PayrollAdapter::new(PayrollConfig {
                base_url: settings.payroll_base_url.clone(),
                timeout: settings.adapter_timeout,
                ..PayrollConfig::default()
            })?;
            Ok(Arc::new(adapter) as Arc<dyn IntegrationAdapter>)
        });
        registry.register_factory(MockBadgeAdapter::NAME, |_| {
            Ok(Arc::new(MockBadgeAdapter::new()) as Arc<dyn IntegrationAdapter>)
        });

        registry
    }

    /// Creates an already initialized registry holding exactly `adapters`.
    pub fn from_adapters(adapters: Vec<Arc<dyn IntegrationAdapter>>) -> Self {
        let registry = Self::new(AdapterSettings {
            active: adapters.iter().map(|a| a.name().to_string()).collect(),
            ..AdapterSettings::default()
        });
        let _ = registry.adapters.set(adapters);
        registry
    }

    /// Sets the time budget for one adapter call, which also bounds each
    /// health check.
    #[must_use]
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.settings.adapter_timeout = timeout;
        self
    }

    /// Registers a factory under a case-insensitive name.
    ///
    /// Has no effect on a registry that is already initialized.
    pub fn register_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AdapterSettings) -> Result<Arc<dyn IntegrationAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(name.trim().to_ascii_lowercase(), Arc::new(factory));
    }

    /// Loads every configured adapter. Returns the number loaded.
    ///
    /// Idempotent: later calls return the result of the first.
    pub fn initialize(&self) -> usize {
        self.adapters.get_or_init(|| self.load()).len()
    }

    fn load(&self) -> Vec<Arc<dyn IntegrationAdapter>> {
        let mut loaded: Vec<Arc<dyn IntegrationAdapter>> = Vec::new();

        for raw_name in &self.settings.active {
            let name = raw_name.trim().to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            if loaded.iter().any(|adapter| adapter.name() == name) {
                warn!(adapter = %name, "adapter listed twice, ignoring duplicate");
                continue;
            }

            let result = self
                .factories
                .get(&name)
                .ok_or_else(|| DeliveryError::unknown_adapter(&name))
                .and_then(|factory| factory(&self.settings));

            match result {
                Ok(adapter) => {
                    info!(adapter = %name, "integration adapter loaded");
                    loaded.push(adapter);
                },
                Err(error) => {
                    warn!(adapter = %name, error = %error, "failed to load integration adapter, skipping");
                },
            }
        }

        if loaded.is_empty() {
            warn!("no integration adapters loaded, events will complete without syncing");
        }

        loaded
    }

    /// Returns the loaded adapters, initializing on first use.
    pub fn adapters(&self) -> &[Arc<dyn IntegrationAdapter>] {
        self.adapters.get_or_init(|| self.load())
    }

    /// Whether `initialize` has run.
    pub fn is_initialized(&self) -> bool {
        self.adapters.get().is_some()
    }

    /// Names of the loaded adapters, in dispatch order.
    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters().iter().map(|a| a.name().to_string()).collect()
    }

    /// Probes every adapter concurrently.
    ///
    /// Each check runs in its own task under the adapter timeout. A check
    /// that errors, times out or panics is reported unhealthy; the others
    /// are still checked.
    pub async fn health_check_all(&self) -> Vec<AdapterHealthReport> {
        let timeout = self.settings.adapter_timeout;

        let checks = self.adapters().iter().map(|adapter| {
            let name = adapter.name().to_string();
            let check = adapter.clone();
            let handle =
                tokio::spawn(async move { tokio::time::timeout(timeout, check.health_check()).await });

            async move {
                let health = match handle.await {
                    Ok(Ok(Ok(health))) => health,
                    Ok(Ok(Err(error))) => AdapterHealth::unhealthy(error.to_string()),
                    Ok(Err(_elapsed)) => {
                        AdapterHealth::unhealthy(DeliveryError::timeout(&name, timeout).to_string())
                    },
                    Err(join_error) => {
                        AdapterHealth::unhealthy(format!("health check panicked: {join_error}"))
                    },
                };
                if !health.healthy {
                    warn!(adapter = %name, message = %health.message, "adapter health check failed");
                }

                AdapterHealthReport {
                    adapter_name: name,
                    healthy: health.healthy,
                    message: health.message,
                }
            }
        });

        futures::future::join_all(checks).await
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut factories: Vec<&String> = self.factories.keys().collect();
        factories.sort();
        f.debug_struct("AdapterRegistry")
            .field("active", &self.settings.active)
            .field("factories", &factories)
            .field("loaded", &self.adapters.get().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(names: &[&str]) -> AdapterSettings {
        AdapterSettings {
            active: names.iter().map(|n| (*n).to_string()).collect(),
            ..AdapterSettings::default()
        }
    }

    #[test]
    fn builtin_adapters_load_in_configured_order() {
        let registry = AdapterRegistry::with_builtin_adapters(settings(&["badge", "payroll"]));

        assert_eq!(registry.initialize(), 2);
        assert_eq!(registry.adapter_names(), vec!["badge", "payroll"]);
    }

    #[test]
    fn unknown_names_and_duplicates_are_skipped() {
        let registry =
            AdapterRegistry::with_builtin_adapters(settings(&["ldap", " Badge ", "badge", ""]));

        assert_eq!(registry.initialize(), 1);
        assert_eq!(registry.adapter_names(), vec!["badge"]);
    }

    #[test]
    fn initialize_is_idempotent() {
        let registry = AdapterRegistry::with_builtin_adapters(settings(&["badge"]));

        assert!(!registry.is_initialized());
        assert_eq!(registry.initialize(), 1);
        assert_eq!(registry.initialize(), 1);
        assert!(registry.is_initialized());
    }
}
