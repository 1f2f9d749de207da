//! Outbox processing for staffsync integration events.
//!
//! Employee mutations are appended to the event log by the
//! [`EventEnqueuer`]. An [`OutboxEngine`] polls the log on a fixed interval,
//! claims due events with a compare-and-swap on their status and fans each
//! one out to every adapter in the [`AdapterRegistry`] through the
//! [`Dispatcher`]. An event succeeds only when every adapter succeeds;
//! otherwise it is retried with exponential backoff until its attempt budget
//! is spent and it is dead-lettered.
//!
//! ```text
//! enqueue ─▶ PENDING ─▶ claim ─▶ PROCESSING ─▶ dispatch ─┬─▶ SUCCESS
//!                ▲                                      ├─▶ FAILED ─(backoff)─▶ claim
//!                └──────────── replay ◀──────────────── └─▶ DEAD
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use staffsync_core::RealClock;
//! use staffsync_delivery::{
//!     storage::mock::MockEventStore, AdapterRegistry, AdapterSettings, Dispatcher, OutboxEngine,
//!     WorkerConfig,
//! };
//!
//! # async fn example() -> staffsync_delivery::Result<()> {
//! let clock = Arc::new(RealClock::new());
//! let store = Arc::new(MockEventStore::new(clock.clone()));
//! let registry = Arc::new(AdapterRegistry::with_builtin_adapters(AdapterSettings::default()));
//! registry.initialize();
//!
//! let dispatcher = Arc::new(Dispatcher::new(registry, AdapterSettings::default().adapter_timeout));
//! let mut engine = OutboxEngine::new(store, dispatcher, WorkerConfig::default(), clock);
//! engine.start().await?;
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod adapters;
pub mod dispatcher;
pub mod engine;
pub mod enqueuer;
pub mod error;
pub mod registry;
pub mod replay;
pub mod retry;
pub mod storage;
pub mod worker;

pub use adapter::{AdapterHealth, AdapterHealthReport, IntegrationAdapter, SyncOutcome};
pub use dispatcher::{AdapterOutcome, AttemptResult, DispatchResult, Dispatcher};
pub use engine::OutboxEngine;
pub use enqueuer::{EventEnqueuer, MutationPublisher, PublishOutcome};
pub use error::{DeliveryError, Result};
pub use registry::{AdapterRegistry, AdapterSettings};
pub use replay::{ReplayRequest, ReplayService};
pub use retry::{RetryDecision, RetryPolicy};
pub use storage::{EventStore, PostgresEventStore};
pub use worker::{CycleReport, EngineStats, OutboxWorker, WorkerConfig};

/// Default number of events claimed per poll cycle.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of failed attempts before an event is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default poll cadence in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default backoff base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 5_000;

/// Default backoff cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Default time budget for one adapter call in milliseconds.
pub const DEFAULT_ADAPTER_TIMEOUT_MS: u64 = 10_000;

/// Default claim lease in milliseconds.
pub const DEFAULT_CLAIM_LEASE_MS: u64 = 300_000;

/// Default number of extra append attempts at enqueue time.
pub const DEFAULT_ENQUEUE_RETRIES: u32 = 2;
