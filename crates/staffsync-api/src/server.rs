//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Timeout enforcement
//! 4. Handler execution

use std::{future::Future, net::SocketAddr, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::{handlers, AppState};

/// Creates the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use staffsync_api::{create_router, AppState};
/// use staffsync_core::RealClock;
/// use staffsync_delivery::{
///     storage::mock::MockEventStore, AdapterRegistry, AdapterSettings, Dispatcher,
/// };
///
/// let clock = Arc::new(RealClock::new());
/// let store = Arc::new(MockEventStore::new(clock.clone()));
/// let registry = Arc::new(AdapterRegistry::with_builtin_adapters(AdapterSettings::default()));
/// let dispatcher = Arc::new(Dispatcher::new(registry, Duration::from_secs(10)));
///
/// let app = create_router(AppState::new(store, dispatcher, true, 2, clock), Duration::from_secs(30));
/// ```
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/live", get(handlers::liveness_check))
        .route("/integrations/health", get(handlers::integrations_health));

    let event_routes = Router::new()
        .route("/events", get(handlers::list_events).post(handlers::publish_event))
        .route("/events/stats", get(handlers::event_stats))
        .route("/events/retry/{id}", post(handlers::retry_event))
        .route("/events/retry-dead", post(handlers::retry_dead_events))
        .route("/events/replay", post(handlers::replay_events));

    Router::new()
        .merge(health_routes)
        .merge(event_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for tracing requests across services.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Starts the HTTP server and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound.
pub async fn start_server<F>(
    state: AppState,
    addr: SocketAddr,
    request_timeout: Duration,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state, request_timeout);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}
