//! Staffsync administrative HTTP API.
//!
//! Exposes the operator surface over the integration event log (listing,
//! retry and replay), an intake endpoint for domain mutations, and health
//! checks. Also owns service configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use staffsync_core::Clock;
use staffsync_delivery::{
    AdapterRegistry, Dispatcher, EventEnqueuer, EventStore, MutationPublisher, ReplayService,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use error::ApiError;
pub use server::{create_router, start_server};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Durable event log.
    pub store: Arc<dyn EventStore>,
    /// Loaded downstream integrations.
    pub registry: Arc<AdapterRegistry>,
    /// Entry point for domain mutations.
    pub publisher: Arc<MutationPublisher>,
    /// Operator retry and replay.
    pub replay: Arc<ReplayService>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires the services over `store` and `dispatcher`.
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<Dispatcher>,
        outbox_enabled: bool,
        enqueue_retries: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let enqueuer = Arc::new(EventEnqueuer::new(store.clone(), clock.clone(), enqueue_retries));
        let publisher =
            Arc::new(MutationPublisher::new(enqueuer, dispatcher.clone(), outbox_enabled));

        Self {
            replay: Arc::new(ReplayService::new(store.clone())),
            registry: dispatcher.registry().clone(),
            store,
            publisher,
            clock,
        }
    }
}
