//! Claim exclusivity when several pollers race for the same events.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use serde_json::json;
use staffsync_core::{Clock, EntityAction, EventStatus, NewIntegrationEvent, TestClock};
use staffsync_delivery::{
    storage::mock::MockEventStore, AdapterRegistry, Dispatcher,
    EventStore, OutboxWorker, WorkerConfig,
};
use staffsync_testing::ScriptedAdapter;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
    let clock = TestClock::new();
    let store = Arc::new(MockEventStore::new(Arc::new(clock.clone())));
    let event = store
        .enqueue(NewIntegrationEvent::employee("EMP0001", EntityAction::Create, json!({})))
        .await
        .unwrap();
    let event_id = event.id;
    let lease_until = clock.now_utc() + chrono::Duration::minutes(5);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.try_claim(event_id, EventStatus::Pending, lease_until).await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(store.get(event.id).await.unwrap().status, EventStatus::Processing);
}

#[tokio::test]
async fn claim_with_stale_status_loses() {
    let clock = TestClock::new();
    let store = MockEventStore::new(Arc::new(clock.clone()));
    let event = store
        .enqueue(NewIntegrationEvent::employee("EMP0001", EntityAction::Create, json!({})))
        .await
        .unwrap();
    let lease_until = clock.now_utc() + chrono::Duration::minutes(5);

    assert!(!store.try_claim(event.id, EventStatus::Failed, lease_until).await.unwrap());
    assert_eq!(store.get(event.id).await.unwrap().status, EventStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_workers_sync_each_event_once() {
    let clock = TestClock::new();
    let store = Arc::new(MockEventStore::new(Arc::new(clock.clone())));
    let adapter = Arc::new(ScriptedAdapter::always_succeeds("payroll"));
    let registry = Arc::new(AdapterRegistry::from_adapters(vec![adapter.clone()]));
    let dispatcher = Arc::new(Dispatcher::new(registry, Duration::from_secs(1)));

    for n in 0..20 {
        store
            .enqueue(NewIntegrationEvent::employee(format!("EMP{n:04}"), EntityAction::Create, json!({})))
            .await
            .unwrap();
    }

    let workers: Vec<Arc<OutboxWorker>> = (0..3)
        .map(|id| {
            Arc::new(OutboxWorker::new(
                id,
                store.clone(),
                dispatcher.clone(),
                WorkerConfig { batch_size: 20, ..WorkerConfig::default() },
                Arc::new(clock.clone()),
            ))
        })
        .collect();

    let handles: Vec<_> = workers
        .iter()
        .map(|worker| {
            let worker = worker.clone();
            tokio::spawn(async move { worker.poll_once().await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        succeeded += handle.await.unwrap().unwrap().succeeded;
    }

    assert_eq!(succeeded, 20);
    assert_eq!(adapter.calls(), 20);
    assert!(store.all().await.iter().all(|e| e.status == EventStatus::Success));
}
