//! Engine lifecycle with a real clock and a short poll interval.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use serde_json::json;
use staffsync_core::{EntityAction, EventStatus, NewIntegrationEvent, RealClock};
use staffsync_delivery::{
    storage::mock::MockEventStore, AdapterRegistry, DeliveryError,
    Dispatcher, EventStore, OutboxEngine, WorkerConfig,
};
use staffsync_testing::ScriptedAdapter;

fn engine(store: Arc<MockEventStore>) -> OutboxEngine {
    let registry = Arc::new(AdapterRegistry::from_adapters(vec![Arc::new(
        ScriptedAdapter::always_succeeds("badge"),
    )]));
    let dispatcher = Arc::new(Dispatcher::new(registry, Duration::from_secs(1)));
    let config = WorkerConfig {
        poll_interval: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(2),
        ..WorkerConfig::default()
    };
    OutboxEngine::new(store, dispatcher, config, Arc::new(RealClock::new()))
}

#[tokio::test]
async fn started_engine_syncs_events_and_shuts_down() {
    let store = Arc::new(MockEventStore::new(Arc::new(RealClock::new())));
    let mut engine = engine(store.clone());

    engine.start().await.unwrap();
    assert!(engine.is_running());

    let event = store
        .enqueue(NewIntegrationEvent::employee("EMP0001", EntityAction::Create, json!({})))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while store.get(event.id).await.map(|e| e.status) != Some(EventStatus::Success) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("engine should sync the event");

    let stats = engine.stats().await;
    assert!(stats.running);
    assert!(stats.succeeded >= 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn second_start_is_rejected() {
    let store = Arc::new(MockEventStore::new(Arc::new(RealClock::new())));
    let mut engine = engine(store);

    engine.start().await.unwrap();
    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, DeliveryError::Configuration { .. }));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_without_start_is_immediate() {
    let store = Arc::new(MockEventStore::new(Arc::new(RealClock::new())));
    let engine = engine(store);

    assert!(!engine.is_running());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn manual_poll_works_without_background_loop() {
    let store = Arc::new(MockEventStore::new(Arc::new(RealClock::new())));
    let engine = engine(store.clone());
    store
        .enqueue(NewIntegrationEvent::employee("EMP0001", EntityAction::Update, json!({})))
        .await
        .unwrap();

    let report = engine.poll_once().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(!engine.stats().await.running);
}
