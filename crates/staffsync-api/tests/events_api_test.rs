//! Event endpoint tests against the in-memory store.
//!
//! Exercises listing, retry, replay and intake through the full router,
//! including the standard error body.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use staffsync_api::{create_router, AppState};
use staffsync_core::{
    Clock, EntityAction, EventId, EventStatus, IntegrationEvent, TestClock,
};
use staffsync_delivery::{
    storage::mock::MockEventStore, AdapterRegistry, Dispatcher,
    IntegrationAdapter,
};
use staffsync_testing::ScriptedAdapter;
use tower::ServiceExt;

struct TestApp {
    store: Arc<MockEventStore>,
    clock: TestClock,
    adapter: Arc<ScriptedAdapter>,
    outbox_enabled: bool,
}

impl TestApp {
    fn new(outbox_enabled: bool) -> Self {
        let clock = TestClock::new();
        Self {
            store: Arc::new(MockEventStore::new(Arc::new(clock.clone()))),
            clock,
            adapter: Arc::new(ScriptedAdapter::always_succeeds("badge")),
            outbox_enabled,
        }
    }

    fn router(&self) -> Router {
        let adapter: Arc<dyn IntegrationAdapter> = self.adapter.clone();
        let registry = Arc::new(AdapterRegistry::from_adapters(vec![adapter]));
        let dispatcher = Arc::new(Dispatcher::new(registry, Duration::from_secs(1)));
        let state = AppState::new(
            self.store.clone(),
            dispatcher,
            self.outbox_enabled,
            0,
            Arc::new(self.clock.clone()),
        );
        create_router(state, Duration::from_secs(5))
    }

    async fn seed(&self, id: i64, entity_id: &str, status: EventStatus) {
        let failed = matches!(status, EventStatus::Failed | EventStatus::Dead);
        self.store
            .insert(IntegrationEvent {
                id: EventId(id),
                entity_type: "employee".to_string(),
                entity_id: entity_id.to_string(),
                action: EntityAction::Update,
                payload: json!({ "employeeId": entity_id }),
                status,
                attempts: if failed { 5 } else { 0 },
                last_error: failed.then(|| "payroll responded HTTP 503".to_string()),
                next_run_at: None,
                created_at: self.clock.now_utc(),
                processed_at: None,
            })
            .await;
        self.clock.advance_ms(1_000);
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            },
            None => Body::empty(),
        };

        let response =
            self.router().oneshot(request.body(body).unwrap()).await.expect("request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response should be JSON")
        };

        (status, json)
    }
}

#[tokio::test]
async fn list_events_paginates_newest_first() {
    let app = TestApp::new(true);
    for n in 1..=5 {
        app.seed(n, &format!("EMP000{n}"), EventStatus::Success).await;
    }

    let (status, body) = app.send("GET", "/events?page=2&limit=2", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 5);
    assert_eq!(body["pages"], 3);
    assert_eq!(body["page"], 2);
    let ids: Vec<&str> =
        body["events"].as_array().unwrap().iter().map(|e| e["entityId"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["EMP0003", "EMP0002"]);
}

#[tokio::test]
async fn list_events_filters_by_status() {
    let app = TestApp::new(true);
    app.seed(1, "EMP0001", EventStatus::Dead).await;
    app.seed(2, "EMP0002", EventStatus::Success).await;

    let (status, body) = app.send("GET", "/events?status=dead", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["events"][0]["status"], "DEAD");
    assert_eq!(body["events"][0]["lastError"], "payroll responded HTTP 503");
}

#[tokio::test]
async fn unknown_status_is_rejected() {
    let app = TestApp::new(true);

    let (status, body) = app.send("GET", "/events?status=archived", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn retry_resets_event() {
    let app = TestApp::new(true);
    app.seed(7, "EMP0007", EventStatus::Dead).await;

    let (status, body) = app.send("POST", "/events/retry/7", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["attempts"], 0);
    assert!(body["lastError"].is_null());
}

#[tokio::test]
async fn retry_unknown_event_is_not_found() {
    let app = TestApp::new(true);

    let (status, body) = app.send("POST", "/events/retry/404", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "EVENT_NOT_FOUND");
}

#[tokio::test]
async fn retry_in_flight_event_conflicts() {
    let app = TestApp::new(true);
    app.seed(3, "EMP0003", EventStatus::Processing).await;

    let (status, body) = app.send("POST", "/events/retry/3", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "EVENT_IN_PROGRESS");
}

#[tokio::test]
async fn retry_dead_returns_count() {
    let app = TestApp::new(true);
    app.seed(1, "EMP0001", EventStatus::Dead).await;
    app.seed(2, "EMP0002", EventStatus::Dead).await;
    app.seed(3, "EMP0003", EventStatus::Failed).await;

    let (status, body) = app.send("POST", "/events/retry-dead", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "count": 2 }));
    assert_eq!(app.store.get(EventId(3)).await.unwrap().status, EventStatus::Failed);
}

#[tokio::test]
async fn replay_applies_filters() {
    let app = TestApp::new(true);
    app.seed(1, "EMP0001", EventStatus::Dead).await;
    app.seed(2, "EMP0002", EventStatus::Failed).await;
    app.seed(3, "EMP0003", EventStatus::Dead).await;

    let (status, body) =
        app.send("POST", "/events/replay", Some(json!({ "status": "DEAD", "entityId": "EMP0003" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "count": 1 }));
    assert_eq!(app.store.get(EventId(3)).await.unwrap().status, EventStatus::Pending);
    assert_eq!(app.store.get(EventId(1)).await.unwrap().status, EventStatus::Dead);
}

#[tokio::test]
async fn replay_without_body_selects_failed_and_dead() {
    let app = TestApp::new(true);
    app.seed(1, "EMP0001", EventStatus::Dead).await;
    app.seed(2, "EMP0002", EventStatus::Failed).await;
    app.seed(3, "EMP0003", EventStatus::Success).await;

    let (status, body) = app.send("POST", "/events/replay", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "count": 2 }));
}

#[tokio::test]
async fn replay_rejects_non_replayable_status() {
    let app = TestApp::new(true);

    let (status, body) =
        app.send("POST", "/events/replay", Some(json!({ "status": "SUCCESS" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn replay_rejects_out_of_range_window() {
    let app = TestApp::new(true);
    app.seed(1, "EMP0001", EventStatus::Dead).await;

    let (status, body) =
        app.send("POST", "/events/replay", Some(json!({ "fromDays": 100_000_000 }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert_eq!(app.store.get(EventId(1)).await.unwrap().status, EventStatus::Dead);
}

#[tokio::test]
async fn publish_queues_event_when_outbox_enabled() {
    let app = TestApp::new(true);

    let (status, body) = app
        .send(
            "POST",
            "/events",
            Some(json!({
                "entityType": "employee",
                "entityId": "EMP0099",
                "action": "CREATE",
                "payload": { "name": "Ada Lovelace" }
            })),
        )
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["mode"], "outbox");
    assert_eq!(body["event"]["status"], "PENDING");
    assert_eq!(app.store.all().await.len(), 1);
    assert_eq!(app.adapter.calls(), 0);
}

#[tokio::test]
async fn publish_syncs_inline_when_outbox_disabled() {
    let app = TestApp::new(false);

    let (status, body) = app
        .send(
            "POST",
            "/events",
            Some(json!({ "entityType": "employee", "entityId": "EMP0099", "action": "DELETE" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "direct");
    assert_eq!(body["success"], true);
    assert_eq!(body["outcomes"][0]["adapter"], "badge");
    assert!(app.store.all().await.is_empty());
    assert_eq!(app.adapter.calls(), 1);
}

#[tokio::test]
async fn publish_rejects_blank_entity_id() {
    let app = TestApp::new(true);

    let (status, body) = app
        .send(
            "POST",
            "/events",
            Some(json!({ "entityType": "employee", "entityId": " ", "action": "UPDATE" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn stats_counts_each_status() {
    let app = TestApp::new(true);
    app.seed(1, "EMP0001", EventStatus::Dead).await;
    app.seed(2, "EMP0002", EventStatus::Success).await;
    app.seed(3, "EMP0003", EventStatus::Success).await;

    let (status, body) = app.send("GET", "/events/stats", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["counts"]["success"], 2);
    assert_eq!(body["counts"]["dead"], 1);
}
