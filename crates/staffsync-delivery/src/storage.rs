//! Event store abstraction used by the worker, enqueuer and replay service.
//!
//! Production code runs against PostgreSQL through
//! [`PostgresEventStore`]. [`mock::MockEventStore`] keeps events in memory
//! with the same compare-and-swap claim semantics, so the state machine can
//! be exercised without a database.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use staffsync_core::{
    storage::Storage, Clock, EventId, EventPage, EventStatus, IntegrationEvent,
    NewIntegrationEvent, ReplayFilter, Result, StatusCounts,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Operations on the durable event log.
pub trait EventStore: Send + Sync + 'static {
    /// Appends a new `PENDING` event with no attempts and no schedule.
    fn enqueue(&self, event: NewIntegrationEvent) -> BoxFuture<'_, IntegrationEvent>;

    /// Returns up to `limit` due `PENDING`/`FAILED` events, oldest first,
    /// together with `PROCESSING` events whose claim lease has expired.
    fn find_due_batch(&self, limit: usize) -> BoxFuture<'_, Vec<IntegrationEvent>>;

    /// Atomically moves a due event into `PROCESSING` if its status still
    /// equals `expected`, holding the claim until `lease_until`. Returns
    /// whether this caller won the claim.
    fn try_claim(
        &self,
        event_id: EventId,
        expected: EventStatus,
        lease_until: DateTime<Utc>,
    ) -> BoxFuture<'_, bool>;

    /// Marks an event `SUCCESS` and stamps `processed_at`.
    fn mark_success(&self, event_id: EventId) -> BoxFuture<'_, ()>;

    /// Records a failure. `Some(next_run_at)` leaves the event `FAILED`;
    /// `None` dead-letters it.
    fn mark_failed_or_dead(
        &self,
        event_id: EventId,
        attempts: i32,
        error: String,
        next_run_at: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, ()>;

    /// Finds an event by id.
    fn find_by_id(&self, event_id: EventId) -> BoxFuture<'_, Option<IntegrationEvent>>;

    /// Lists events newest first.
    fn list_events(
        &self,
        status: Option<EventStatus>,
        page: u32,
        limit: u32,
    ) -> BoxFuture<'_, EventPage>;

    /// Counts events per status.
    fn count_by_status(&self) -> BoxFuture<'_, StatusCounts>;

    /// Resets one event to a fresh `PENDING` state. Refuses events under an
    /// unexpired claim.
    fn reset_one(&self, event_id: EventId) -> BoxFuture<'_, IntegrationEvent>;

    /// Resets every `DEAD` event. Returns the number affected.
    fn reset_all_dead(&self) -> BoxFuture<'_, u64>;

    /// Resets every event matching `filter`. Returns the number affected.
    fn replay(&self, filter: ReplayFilter) -> BoxFuture<'_, u64>;

    /// Verifies the store is reachable.
    fn health_check(&self) -> BoxFuture<'_, ()>;
}

/// Event store backed by the PostgreSQL repository.
pub struct PostgresEventStore {
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }
}

impl EventStore for PostgresEventStore {
    fn enqueue(&self, event: NewIntegrationEvent) -> BoxFuture<'_, IntegrationEvent> {
        let now = self.clock.now_utc();
        Box::pin(async move { self.storage.integration_events.create(&event, now).await })
    }

    fn find_due_batch(&self, limit: usize) -> BoxFuture<'_, Vec<IntegrationEvent>> {
        let now = self.clock.now_utc();
        Box::pin(async move { self.storage.integration_events.find_due(limit, now).await })
    }

    fn try_claim(
        &self,
        event_id: EventId,
        expected: EventStatus,
        lease_until: DateTime<Utc>,
    ) -> BoxFuture<'_, bool> {
        let now = self.clock.now_utc();
        Box::pin(async move {
            self.storage.integration_events.try_claim(event_id, expected, now, lease_until).await
        })
    }

    fn mark_success(&self, event_id: EventId) -> BoxFuture<'_, ()> {
        let now = self.clock.now_utc();
        Box::pin(async move { self.storage.integration_events.mark_success(event_id, now).await })
    }

    fn mark_failed_or_dead(
        &self,
        event_id: EventId,
        attempts: i32,
        error: String,
        next_run_at: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.storage
                .integration_events
                .mark_failed_or_dead(event_id, attempts, &error, next_run_at)
                .await
        })
    }

    fn find_by_id(&self, event_id: EventId) -> BoxFuture<'_, Option<IntegrationEvent>> {
        Box::pin(async move { self.storage.integration_events.find_by_id(event_id).await })
    }

    fn list_events(
        &self,
        status: Option<EventStatus>,
        page: u32,
        limit: u32,
    ) -> BoxFuture<'_, EventPage> {
        Box::pin(async move { self.storage.integration_events.list(status, page, limit).await })
    }

    fn count_by_status(&self) -> BoxFuture<'_, StatusCounts> {
        Box::pin(async move { self.storage.integration_events.count_by_status().await })
    }

    fn reset_one(&self, event_id: EventId) -> BoxFuture<'_, IntegrationEvent> {
        let now = self.clock.now_utc();
        Box::pin(async move { self.storage.integration_events.reset_one(event_id, now).await })
    }

    fn reset_all_dead(&self) -> BoxFuture<'_, u64> {
        Box::pin(async move { self.storage.integration_events.reset_all_dead().await })
    }

    fn replay(&self, filter: ReplayFilter) -> BoxFuture<'_, u64> {
        Box::pin(async move { self.storage.integration_events.replay(&filter).await })
    }

    fn health_check(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.storage.health_check().await })
    }
}

pub mod mock {
    //! In-memory event store.
    //!
    //! A single mutex guards all events, which makes `try_claim` a true
    //! compare-and-swap. Supports injecting append, poll and outcome-write
    //! failures.

    use std::{
        collections::BTreeMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use chrono::{DateTime, Utc};
    use staffsync_core::{
        Clock, CoreError, EventId, EventPage, EventStatus, IntegrationEvent, NewIntegrationEvent,
        ReplayFilter, StatusCounts,
    };
    use tokio::sync::Mutex;

    use super::{BoxFuture, EventStore};

    #[derive(Debug, Default)]
    struct State {
        events: BTreeMap<EventId, IntegrationEvent>,
        next_id: i64,
    }

    impl State {
        fn reset(event: &mut IntegrationEvent) {
            event.status = EventStatus::Pending;
            event.attempts = 0;
            event.last_error = None;
            event.next_run_at = None;
        }
    }

    /// Mock event store for tests and database-less runs.
    #[derive(Debug)]
    pub struct MockEventStore {
        state: Arc<Mutex<State>>,
        clock: Arc<dyn Clock>,
        enqueue_failures: AtomicUsize,
        mark_failures: AtomicUsize,
        find_due_error: Mutex<Option<String>>,
    }

    impl MockEventStore {
        /// Creates an empty store reading time from `clock`.
        pub fn new(clock: Arc<dyn Clock>) -> Self {
            Self {
                state: Arc::new(Mutex::new(State { events: BTreeMap::new(), next_id: 1 })),
                clock,
                enqueue_failures: AtomicUsize::new(0),
                mark_failures: AtomicUsize::new(0),
                find_due_error: Mutex::new(None),
            }
        }

        /// Inserts a fully formed event, keeping its id and timestamps.
        pub async fn insert(&self, event: IntegrationEvent) -> EventId {
            let mut state = self.state.lock().await;
            let id = event.id;
            state.next_id = state.next_id.max(id.0 + 1);
            state.events.insert(id, event);
            id
        }

        /// Returns a snapshot of one event.
        pub async fn get(&self, event_id: EventId) -> Option<IntegrationEvent> {
            self.state.lock().await.events.get(&event_id).cloned()
        }

        /// Returns a snapshot of every event, in id order.
        pub async fn all(&self) -> Vec<IntegrationEvent> {
            self.state.lock().await.events.values().cloned().collect()
        }

        /// Makes the next `count` appends fail with a database error.
        pub fn inject_enqueue_failures(&self, count: usize) {
            self.enqueue_failures.store(count, Ordering::SeqCst);
        }

        /// Makes the next `count` outcome writes (`mark_success` or
        /// `mark_failed_or_dead`) fail with a database error.
        pub fn inject_mark_failures(&self, count: usize) {
            self.mark_failures.store(count, Ordering::SeqCst);
        }

        /// Makes the next poll fail with a database error.
        pub async fn inject_find_due_error(&self, message: impl Into<String>) {
            *self.find_due_error.lock().await = Some(message.into());
        }

        fn take_enqueue_failure(&self) -> bool {
            take_one(&self.enqueue_failures)
        }

        fn take_mark_failure(&self) -> bool {
            take_one(&self.mark_failures)
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }

    impl EventStore for MockEventStore {
        fn enqueue(&self, event: NewIntegrationEvent) -> BoxFuture<'_, IntegrationEvent> {
            let now = self.clock.now_utc();
            Box::pin(async move {
                if self.take_enqueue_failure() {
                    return Err(CoreError::Database("injected append failure".to_string()));
                }
                event.validate()?;

                let mut state = self.state.lock().await;
                let id = EventId(state.next_id);
                state.next_id += 1;

                let stored = IntegrationEvent {
                    id,
                    entity_type: event.entity_type,
                    entity_id: event.entity_id,
                    action: event.action,
                    payload: event.payload,
                    status: EventStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    next_run_at: None,
                    created_at: now,
                    processed_at: None,
                };
                state.events.insert(id, stored.clone());
                Ok(stored)
            })
        }

        fn find_due_batch(&self, limit: usize) -> BoxFuture<'_, Vec<IntegrationEvent>> {
            let now = self.clock.now_utc();
            Box::pin(async move {
                if let Some(message) = self.find_due_error.lock().await.take() {
                    return Err(CoreError::Database(message));
                }

                let state = self.state.lock().await;
                let mut due: Vec<IntegrationEvent> =
                    state.events.values().filter(|e| e.is_due(now)).cloned().collect();
                due.sort_by_key(|e| (e.created_at, e.id));
                due.truncate(limit);
                Ok(due)
            })
        }

        fn try_claim(
            &self,
            event_id: EventId,
            expected: EventStatus,
            lease_until: DateTime<Utc>,
        ) -> BoxFuture<'_, bool> {
            let now = self.clock.now_utc();
            Box::pin(async move {
                let mut state = self.state.lock().await;
                match state.events.get_mut(&event_id) {
                    Some(event) if event.status == expected && event.is_due(now) => {
                        event.status = EventStatus::Processing;
                        event.next_run_at = Some(lease_until);
                        Ok(true)
                    },
                    _ => Ok(false),
                }
            })
        }

        fn mark_success(&self, event_id: EventId) -> BoxFuture<'_, ()> {
            let now = self.clock.now_utc();
            Box::pin(async move {
                if self.take_mark_failure() {
                    return Err(CoreError::Database("injected outcome write failure".to_string()));
                }
                if let Some(event) = self.state.lock().await.events.get_mut(&event_id) {
                    event.status = EventStatus::Success;
                    event.processed_at = Some(now);
                    event.last_error = None;
                    event.next_run_at = None;
                }
                Ok(())
            })
        }

        fn mark_failed_or_dead(
            &self,
            event_id: EventId,
            attempts: i32,
            error: String,
            next_run_at: Option<DateTime<Utc>>,
        ) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                if self.take_mark_failure() {
                    return Err(CoreError::Database("injected outcome write failure".to_string()));
                }
                if let Some(event) = self.state.lock().await.events.get_mut(&event_id) {
                    event.status =
                        if next_run_at.is_some() { EventStatus::Failed } else { EventStatus::Dead };
                    event.attempts = attempts;
                    event.last_error = Some(error);
                    event.next_run_at = next_run_at;
                }
                Ok(())
            })
        }

        fn find_by_id(&self, event_id: EventId) -> BoxFuture<'_, Option<IntegrationEvent>> {
            Box::pin(async move { Ok(self.get(event_id).await) })
        }

        fn list_events(
            &self,
            status: Option<EventStatus>,
            page: u32,
            limit: u32,
        ) -> BoxFuture<'_, EventPage> {
            Box::pin(async move {
                let state = self.state.lock().await;
                let mut matching: Vec<&IntegrationEvent> = state
                    .events
                    .values()
                    .filter(|e| status.is_none_or(|s| e.status == s))
                    .collect();
                matching.sort_by_key(|e| std::cmp::Reverse((e.created_at, e.id)));

                let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
                let offset = usize::try_from(EventPage::offset(page, limit)).unwrap_or(usize::MAX);
                let events = matching
                    .into_iter()
                    .skip(offset)
                    .take(limit as usize)
                    .cloned()
                    .collect();

                Ok(EventPage::new(events, total, page, limit))
            })
        }

        fn count_by_status(&self) -> BoxFuture<'_, StatusCounts> {
            Box::pin(async move {
                let mut counts = StatusCounts::default();
                for event in self.state.lock().await.events.values() {
                    counts.record(event.status, 1);
                }
                Ok(counts)
            })
        }

        fn reset_one(&self, event_id: EventId) -> BoxFuture<'_, IntegrationEvent> {
            let now = self.clock.now_utc();
            Box::pin(async move {
                let mut state = self.state.lock().await;
                match state.events.get_mut(&event_id) {
                    None => Err(CoreError::NotFound(format!("event {event_id} not found"))),
                    Some(event)
                        if event.status == EventStatus::Processing && !event.claim_expired(now) =>
                    {
                        Err(CoreError::ConstraintViolation(format!(
                            "event {event_id} is being processed"
                        )))
                    },
                    Some(event) => {
                        State::reset(event);
                        Ok(event.clone())
                    },
                }
            })
        }

        fn reset_all_dead(&self) -> BoxFuture<'_, u64> {
            Box::pin(async move {
                let mut state = self.state.lock().await;
                let mut count = 0;
                for event in state.events.values_mut().filter(|e| e.status == EventStatus::Dead) {
                    State::reset(event);
                    count += 1;
                }
                Ok(count)
            })
        }

        fn replay(&self, filter: ReplayFilter) -> BoxFuture<'_, u64> {
            Box::pin(async move {
                let mut state = self.state.lock().await;
                let mut count = 0;
                for event in state.events.values_mut().filter(|e| filter.matches(e)) {
                    State::reset(event);
                    count += 1;
                }
                Ok(count)
            })
        }

        fn health_check(&self) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                match self.find_due_error.lock().await.as_ref() {
                    Some(message) => Err(CoreError::Database(message.clone())),
                    None => Ok(()),
                }
            })
        }
    }
}
