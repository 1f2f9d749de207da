//! Producer side of the outbox.
//!
//! The domain service calls [`EventEnqueuer::enqueue`] after its own write
//! has committed and waits only for the append. A failed append is retried a
//! few times with a doubling delay before the error is returned; validation
//! errors are returned at once.

use std::{sync::Arc, time::Duration};

use staffsync_core::{Clock, CoreError, IntegrationEvent, NewIntegrationEvent, Result};
use tracing::{debug, error, info, warn};

use crate::{
    dispatcher::{DispatchResult, Dispatcher},
    storage::EventStore,
};

/// Delay before the first append retry.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Appends integration events to the store.
pub struct EventEnqueuer {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    retries: u32,
    retry_delay: Duration,
}

impl EventEnqueuer {
    /// Creates an enqueuer that retries a failed append `retries` times.
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, retries: u32) -> Self {
        Self { store, clock, retries, retry_delay: INITIAL_RETRY_DELAY }
    }

    /// Overrides the delay before the first retry.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Appends `event` as `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed event, or the last storage
    /// error once every retry has failed.
    pub async fn enqueue(&self, event: NewIntegrationEvent) -> Result<IntegrationEvent> {
        event.validate()?;

        let mut delay = self.retry_delay;
        let mut attempt = 0;

        loop {
            match self.store.enqueue(event.clone()).await {
                Ok(created) => {
                    debug!(
                        event_id = %created.id,
                        entity_type = %created.entity_type,
                        entity_id = %created.entity_id,
                        action = %created.action,
                        "integration event enqueued"
                    );
                    return Ok(created);
                },
                Err(error @ CoreError::InvalidInput(_)) => return Err(error),
                Err(error) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        entity_id = %event.entity_id,
                        attempt,
                        max_retries = self.retries,
                        error = %error,
                        "failed to append integration event, retrying"
                    );
                    self.clock.sleep(delay).await;
                    delay = delay.saturating_mul(2);
                },
                Err(error) => {
                    error!(
                        entity_type = %event.entity_type,
                        entity_id = %event.entity_id,
                        action = %event.action,
                        error = %error,
                        "failed to append integration event, change will not be propagated"
                    );
                    return Err(error);
                },
            }
        }
    }
}

/// How a mutation was handed off.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    /// Appended to the outbox for the worker to process.
    Queued(IntegrationEvent),
    /// Synced inline because the outbox is disabled.
    Synced(DispatchResult),
}

/// Entry point for domain mutations.
///
/// Routes through the outbox when enabled, or straight through the
/// dispatcher otherwise.
pub struct MutationPublisher {
    enqueuer: Arc<EventEnqueuer>,
    dispatcher: Arc<Dispatcher>,
    outbox_enabled: bool,
}

impl MutationPublisher {
    /// Creates a publisher.
    pub fn new(
        enqueuer: Arc<EventEnqueuer>,
        dispatcher: Arc<Dispatcher>,
        outbox_enabled: bool,
    ) -> Self {
        Self { enqueuer, dispatcher, outbox_enabled }
    }

    /// Whether mutations go through the outbox.
    pub fn outbox_enabled(&self) -> bool {
        self.outbox_enabled
    }

    /// Hands one mutation off for propagation.
    ///
    /// # Errors
    ///
    /// Returns an error only when the outbox append fails. Inline sync
    /// failures are reported in the returned `DispatchResult`.
    pub async fn publish(&self, event: NewIntegrationEvent) -> Result<PublishOutcome> {
        if self.outbox_enabled {
            return self.enqueuer.enqueue(event).await.map(PublishOutcome::Queued);
        }

        event.validate()?;
        let result =
            self.dispatcher.sync_to_all(&event.entity_id, event.action, &event.payload).await;
        info!(
            entity_id = %event.entity_id,
            action = %event.action,
            success = result.success,
            "mutation synced without outbox"
        );
        Ok(PublishOutcome::Synced(result))
    }
}
