//! Poll loop that claims due events and drives them through the dispatcher.
//!
//! One cycle fetches a batch of due events, claims each with a
//! compare-and-swap on its status and processes the claimed ones in order.
//! Losing a claim is normal when several processes poll the same table and
//! is only counted. Failures never escape a cycle: each one is recorded on
//! the event as a scheduled retry or a dead-letter.
//!
//! Every claim carries a lease. An event whose outcome could not be written
//! stays `PROCESSING` until the lease runs out, then a later poll reclaims
//! it and syncs it again.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use staffsync_core::{Clock, EventStatus, IntegrationEvent};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    dispatcher::{AttemptResult, Dispatcher},
    error::{DeliveryError, Result},
    retry::{RetryDecision, RetryPolicy},
    storage::EventStore,
};

/// Configuration for the outbox worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum events fetched per cycle.
    pub batch_size: usize,

    /// Time between the end of one cycle and the start of the next.
    pub poll_interval: Duration,

    /// Backoff and dead-letter policy.
    pub retry_policy: RetryPolicy,

    /// How long a claim stays exclusive. Must outlast one dispatch.
    pub claim_lease: Duration,

    /// Maximum time to wait for the worker on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
            retry_policy: RetryPolicy::default(),
            claim_lease: Duration::from_millis(crate::DEFAULT_CLAIM_LEASE_MS),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Running totals since the worker was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Whether the background loop is running.
    pub running: bool,
    /// Completed poll cycles.
    pub cycles: u64,
    /// Cycles skipped because another was still running.
    pub skipped_cycles: u64,
    /// Events this worker claimed.
    pub events_claimed: u64,
    /// Events marked `SUCCESS`.
    pub succeeded: u64,
    /// Failures scheduled for another attempt.
    pub retried: u64,
    /// Events moved to `DEAD`.
    pub dead_lettered: u64,
    /// Claims lost to another worker.
    pub claim_conflicts: u64,
    /// Expired claims taken over from a stalled attempt.
    pub reclaimed: u64,
}

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// True when the cycle did not run because another was in progress.
    pub skipped: bool,
    /// Due events returned by the store.
    pub fetched: usize,
    /// Events this worker claimed.
    pub claimed: usize,
    /// Claimed events that succeeded.
    pub succeeded: usize,
    /// Claimed events scheduled for retry.
    pub retried: usize,
    /// Claimed events dead-lettered.
    pub dead_lettered: usize,
    /// Claims lost to another worker.
    pub conflicts: usize,
    /// Claimed events whose previous claim had expired.
    pub reclaimed: usize,
}

enum Disposition {
    Succeeded,
    Retried,
    DeadLettered,
}

/// Clears the in-progress flag when a cycle ends, even by panic.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single poller that claims and processes integration events.
pub struct OutboxWorker {
    id: usize,
    store: Arc<dyn EventStore>,
    dispatcher: Arc<Dispatcher>,
    config: WorkerConfig,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
    cycle_running: AtomicBool,
}

impl OutboxWorker {
    /// Creates a worker with its own cancellation token.
    pub fn new(
        id: usize,
        store: Arc<dyn EventStore>,
        dispatcher: Arc<Dispatcher>,
        config: WorkerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            store,
            dispatcher,
            config,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            cancellation_token: CancellationToken::new(),
            clock,
            cycle_running: AtomicBool::new(false),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Returns a snapshot of the running totals.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Polls until cancelled.
    ///
    /// A failed cycle is logged and the loop carries on after the usual
    /// interval.
    pub async fn run(&self) {
        info!(worker_id = self.id, "outbox worker starting");
        self.stats.write().await.running = true;

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(worker_id = self.id, "outbox worker received shutdown signal");
                break;
            }

            if let Err(error) = self.poll_once().await {
                error!(worker_id = self.id, error = %error, "outbox poll cycle failed");
            }

            tokio::select! {
                () = self.clock.sleep(self.config.poll_interval) => {},
                () = self.cancellation_token.cancelled() => break,
            }
        }

        self.stats.write().await.running = false;
        info!(worker_id = self.id, "outbox worker stopped");
    }

    /// Runs one poll cycle.
    ///
    /// Returns a skipped report without touching the store if a cycle is
    /// already in progress on this worker.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Storage` if the due batch cannot be fetched.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        if self
            .cycle_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(worker_id = self.id, "previous poll cycle still running, skipping");
            self.stats.write().await.skipped_cycles += 1;
            return Ok(CycleReport { skipped: true, ..CycleReport::default() });
        }
        let _guard = CycleGuard(&self.cycle_running);

        let events = self.store.find_due_batch(self.config.batch_size).await.map_err(|e| {
            DeliveryError::storage(format!("failed to fetch due events: {e}"))
        })?;

        let mut report = CycleReport { fetched: events.len(), ..CycleReport::default() };

        for event in events {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.store.try_claim(event.id, event.status, self.lease_until()).await {
                Ok(true) => {},
                Ok(false) => {
                    debug!(worker_id = self.id, event_id = %event.id, "event claimed by another worker");
                    report.conflicts += 1;
                    continue;
                },
                Err(error) => {
                    error!(worker_id = self.id, event_id = %event.id, error = %error, "claim failed");
                    continue;
                },
            }
            report.claimed += 1;
            if event.status == EventStatus::Processing {
                warn!(
                    worker_id = self.id,
                    event_id = %event.id,
                    entity_id = %event.entity_id,
                    "reclaimed event whose claim lease expired"
                );
                report.reclaimed += 1;
            }

            match self.process_event(&event).await {
                Ok(Disposition::Succeeded) => report.succeeded += 1,
                Ok(Disposition::Retried) => report.retried += 1,
                Ok(Disposition::DeadLettered) => report.dead_lettered += 1,
                Err(error) => {
                    error!(
                        worker_id = self.id,
                        event_id = %event.id,
                        error = %error,
                        "failed to record event outcome, event is reclaimed when its lease expires"
                    );
                },
            }
        }

        debug!(
            worker_id = self.id,
            fetched = report.fetched,
            claimed = report.claimed,
            conflicts = report.conflicts,
            "poll cycle complete"
        );

        self.record_cycle(&report).await;
        Ok(report)
    }

    async fn record_cycle(&self, report: &CycleReport) {
        let mut stats = self.stats.write().await;
        stats.cycles += 1;
        stats.events_claimed += report.claimed as u64;
        stats.succeeded += report.succeeded as u64;
        stats.retried += report.retried as u64;
        stats.dead_lettered += report.dead_lettered as u64;
        stats.claim_conflicts += report.conflicts as u64;
        stats.reclaimed += report.reclaimed as u64;
    }

    fn lease_until(&self) -> DateTime<Utc> {
        let now = self.clock.now_utc();
        TimeDelta::from_std(self.config.claim_lease)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Dispatches a claimed event and records the outcome on it.
    async fn process_event(&self, event: &IntegrationEvent) -> Result<Disposition> {
        let dispatch =
            self.dispatcher.sync_to_all(&event.entity_id, event.action, &event.payload).await;

        match dispatch.attempt_result() {
            AttemptResult::Success => {
                self.store.mark_success(event.id).await?;
                info!(
                    worker_id = self.id,
                    event_id = %event.id,
                    entity_id = %event.entity_id,
                    attempts = event.attempts,
                    "integration event synced"
                );
                Ok(Disposition::Succeeded)
            },
            AttemptResult::Failure(message) => self.record_failure(event, message).await,
        }
    }

    async fn record_failure(&self, event: &IntegrationEvent, message: String) -> Result<Disposition> {
        let previous = u32::try_from(event.attempts).unwrap_or(0);
        let attempts = previous.saturating_add(1);
        let stored_attempts = i32::try_from(attempts).unwrap_or(i32::MAX);

        match self.config.retry_policy.decide(attempts, self.clock.now_utc()) {
            RetryDecision::Retry { next_run_at } => {
                self.store
                    .mark_failed_or_dead(event.id, stored_attempts, message.clone(), Some(next_run_at))
                    .await?;
                warn!(
                    worker_id = self.id,
                    event_id = %event.id,
                    entity_id = %event.entity_id,
                    attempts,
                    next_run_at = %next_run_at,
                    error = %message,
                    "integration event failed, retry scheduled"
                );
                Ok(Disposition::Retried)
            },
            RetryDecision::DeadLetter { reason } => {
                self.store.mark_failed_or_dead(event.id, stored_attempts, message.clone(), None).await?;
                error!(
                    worker_id = self.id,
                    event_id = %event.id,
                    entity_id = %event.entity_id,
                    attempts,
                    reason = %reason,
                    error = %message,
                    "integration event dead-lettered"
                );
                Ok(Disposition::DeadLettered)
            },
        }
    }
}
