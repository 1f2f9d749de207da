//! Registry loading and aggregate health checks.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use staffsync_delivery::{
    AdapterRegistry, AdapterSettings, DeliveryError, IntegrationAdapter,
};
use staffsync_testing::{ScriptedAdapter, Step};

#[tokio::test]
async fn health_check_reports_every_adapter() {
    let registry = AdapterRegistry::from_adapters(vec![
        Arc::new(ScriptedAdapter::always_succeeds("payroll")),
        Arc::new(ScriptedAdapter::always_succeeds("badge").unhealthy()),
    ]);

    let reports = registry.health_check_all().await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].adapter_name, "payroll");
    assert!(reports[0].healthy);
    assert_eq!(reports[1].adapter_name, "badge");
    assert!(!reports[1].healthy);
    assert!(reports[1].message.contains("health check failed"));
}

#[tokio::test]
async fn hanging_or_panicking_health_check_is_isolated() {
    let registry = AdapterRegistry::from_adapters(vec![
        Arc::new(ScriptedAdapter::always_succeeds("payroll").with_health(Step::Delay(Duration::from_secs(30)))),
        Arc::new(ScriptedAdapter::always_succeeds("badge").with_health(Step::Panic)),
        Arc::new(ScriptedAdapter::always_succeeds("ledger")),
    ])
    .with_adapter_timeout(Duration::from_millis(50));

    let reports = tokio::time::timeout(Duration::from_secs(5), registry.health_check_all())
        .await
        .expect("health checks should not wait for a hanging check");

    assert_eq!(reports.len(), 3);
    assert!(!reports[0].healthy);
    assert_eq!(reports[0].message, "adapter payroll timed out after 50ms");
    assert!(!reports[1].healthy);
    assert!(reports[1].message.contains("panicked"));
    assert!(reports[2].healthy);
}

#[tokio::test]
async fn failing_factory_does_not_block_others() {
    let mut registry = AdapterRegistry::new(AdapterSettings {
        active: vec!["ledger".to_string(), "Badge ".to_string()],
        ..AdapterSettings::default()
    });
    registry.register_factory("ledger", |_| {
        Err(DeliveryError::configuration("ledger credentials missing"))
    });
    registry.register_factory("badge", |_| {
        Ok(Arc::new(ScriptedAdapter::always_succeeds("badge")) as Arc<dyn IntegrationAdapter>)
    });

    assert_eq!(registry.initialize(), 1);
    assert_eq!(registry.adapter_names(), vec!["badge".to_string()]);
}

#[tokio::test]
async fn builtin_badge_adapter_is_healthy() {
    let registry = AdapterRegistry::with_builtin_adapters(AdapterSettings {
        active: vec!["badge".to_string()],
        ..AdapterSettings::default()
    });
    registry.initialize();

    let reports = registry.health_check_all().await;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].healthy);
}

#[test]
fn first_access_loads_configured_adapters() {
    let registry = AdapterRegistry::with_builtin_adapters(AdapterSettings::default());
    assert!(!registry.is_initialized());

    assert_eq!(registry.adapter_names(), vec!["payroll".to_string(), "badge".to_string()]);
    assert!(registry.is_initialized());
    assert_eq!(registry.initialize(), 2);
}
