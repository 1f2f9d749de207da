//! Payroll adapter against a mock HTTP server.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use serde_json::json;
use staffsync_core::EntityAction;
use staffsync_delivery::{
    adapters::{PayrollAdapter, PayrollConfig},
    DeliveryError, IntegrationAdapter,
};
use wiremock::{
    matchers::{body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn adapter(server: &MockServer) -> PayrollAdapter {
    PayrollAdapter::new(PayrollConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(2),
        ..PayrollConfig::default()
    })
    .expect("adapter should build")
}

#[tokio::test]
async fn create_puts_employee_snapshot() {
    let server = MockServer::start().await;
    let payload = json!({ "employeeId": "EMP0042", "name": "Grace Hopper", "salary": 120000 });

    Mock::given(method("PUT"))
        .and(path("/employees/EMP0042"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = adapter(&server).sync("EMP0042", &payload, EntityAction::Create).await.unwrap();

    assert!(outcome.success);
}

#[tokio::test]
async fn reserved_characters_stay_inside_the_employee_segment() {
    let server = MockServer::start().await;
    let payload = json!({ "employeeId": "EMP1#x" });

    Mock::given(method("PUT"))
        .and(path("/employees/EMP1%23x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/employees/EMP1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = adapter(&server).sync("EMP1#x", &payload, EntityAction::Update).await.unwrap();

    assert!(outcome.success);
}

#[tokio::test]
async fn delete_of_unknown_employee_is_success() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/employees/EMP0404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = adapter(&server).sync("EMP0404", &json!({}), EntityAction::Delete).await.unwrap();

    assert!(outcome.success);
}

#[tokio::test]
async fn server_error_is_reported_as_failed_outcome() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/employees/EMP0001"))
        .respond_with(ResponseTemplate::new(500).set_body_string("ledger locked"))
        .mount(&server)
        .await;

    let outcome = adapter(&server).sync("EMP0001", &json!({}), EntityAction::Update).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.message, "payroll responded HTTP 500: ledger locked");
}

#[tokio::test]
async fn unreachable_server_is_an_adapter_error() {
    let adapter = PayrollAdapter::new(PayrollConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout: Duration::from_millis(500),
        ..PayrollConfig::default()
    })
    .unwrap();

    let err = adapter.sync("EMP0001", &json!({}), EntityAction::Create).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Adapter { ref adapter, .. } if adapter == "payroll"));
}

#[tokio::test]
async fn health_check_reflects_health_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    assert!(adapter.health_check().await.unwrap().healthy);

    let degraded = adapter.health_check().await.unwrap();
    assert!(!degraded.healthy);
    assert!(degraded.message.contains("503"));
}
