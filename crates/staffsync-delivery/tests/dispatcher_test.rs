//! Fan-out behavior of the dispatcher across adapters.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use serde_json::json;
use staffsync_core::EntityAction;
use staffsync_delivery::{
    AdapterRegistry, AttemptResult, Dispatcher, IntegrationAdapter,
};
use staffsync_testing::{ScriptedAdapter, Step};

fn dispatcher(adapters: Vec<Arc<dyn IntegrationAdapter>>, timeout: Duration) -> Dispatcher {
    Dispatcher::new(Arc::new(AdapterRegistry::from_adapters(adapters)), timeout)
}

#[tokio::test]
async fn all_adapters_succeeding_is_success() {
    let dispatcher = dispatcher(
        vec![
            Arc::new(ScriptedAdapter::always_succeeds("payroll")),
            Arc::new(ScriptedAdapter::always_succeeds("badge")),
        ],
        Duration::from_secs(1),
    );

    let result = dispatcher.sync_to_all("EMP0001", EntityAction::Create, &json!({})).await;

    assert!(result.success);
    assert_eq!(result.message, "synced to 2 adapter(s)");
    assert_eq!(result.attempt_result(), AttemptResult::Success);
    let names: Vec<&str> = result.outcomes.iter().map(|o| o.adapter.as_str()).collect();
    assert_eq!(names, vec!["payroll", "badge"]);
}

#[tokio::test]
async fn one_failing_adapter_fails_the_event_and_all_are_retried() {
    let ok = Arc::new(ScriptedAdapter::always_succeeds("badge"));
    let failing = Arc::new(ScriptedAdapter::always_fails("payroll", "payroll rejected record"));
    let dispatcher = dispatcher(vec![ok.clone(), failing.clone()], Duration::from_secs(1));

    let first = dispatcher.sync_to_all("EMP0001", EntityAction::Update, &json!({})).await;
    assert!(!first.success);
    assert_eq!(first.attempt_result(), AttemptResult::Failure("payroll rejected record".to_string()));
    assert_eq!(first.outcomes[0].result, AttemptResult::Success);

    let second = dispatcher.sync_to_all("EMP0001", EntityAction::Update, &json!({})).await;
    assert!(!second.success);

    assert_eq!(ok.calls(), 2);
    assert_eq!(failing.calls(), 2);
}

#[tokio::test]
async fn failure_messages_are_joined() {
    let dispatcher = dispatcher(
        vec![
            Arc::new(ScriptedAdapter::always_fails("payroll", "first")),
            Arc::new(ScriptedAdapter::always_fails("badge", "second")),
        ],
        Duration::from_secs(1),
    );

    let result = dispatcher.sync_to_all("EMP0001", EntityAction::Delete, &json!({})).await;

    assert_eq!(result.message, "first; second");
}

#[tokio::test]
async fn slow_adapter_times_out() {
    let slow = Arc::new(ScriptedAdapter::new(
        "payroll",
        Vec::new(),
        Step::Delay(Duration::from_secs(5)),
    ));
    let fast = Arc::new(ScriptedAdapter::always_succeeds("badge"));
    let dispatcher = dispatcher(vec![slow, fast], Duration::from_millis(50));

    let started = std::time::Instant::now();
    let result = dispatcher.sync_to_all("EMP0001", EntityAction::Create, &json!({})).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!result.success);
    assert_eq!(result.message, "adapter payroll timed out after 50ms");
    assert_eq!(result.outcomes[1].result, AttemptResult::Success);
}

#[tokio::test]
async fn adapter_error_becomes_failure() {
    let dispatcher = dispatcher(
        vec![Arc::new(ScriptedAdapter::new("payroll", Vec::new(), Step::Error("connection refused".to_string())))],
        Duration::from_secs(1),
    );

    let result = dispatcher.sync_to_all("EMP0001", EntityAction::Create, &json!({})).await;

    assert!(!result.success);
    assert!(result.message.contains("connection refused"));
}

#[tokio::test]
async fn panicking_adapter_is_isolated() {
    let ok = Arc::new(ScriptedAdapter::always_succeeds("badge"));
    let dispatcher = dispatcher(
        vec![Arc::new(ScriptedAdapter::new("payroll", Vec::new(), Step::Panic)), ok.clone()],
        Duration::from_secs(1),
    );

    let result = dispatcher.sync_to_all("EMP0001", EntityAction::Update, &json!({})).await;

    assert!(!result.success);
    assert!(result.message.contains("panicked"));
    assert_eq!(ok.calls(), 1);
}

#[tokio::test]
async fn empty_registry_counts_as_success() {
    let dispatcher = dispatcher(Vec::new(), Duration::from_secs(1));

    let result = dispatcher.sync_to_all("EMP0001", EntityAction::Create, &json!({})).await;

    assert!(result.success);
    assert!(result.outcomes.is_empty());
}
