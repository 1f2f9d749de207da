//! Lifecycle of the background outbox worker.
//!
//! ```text
//! ┌──────────────┐  spawn  ┌──────────────┐  poll   ┌─────────────┐
//! │ OutboxEngine │────────▶│ OutboxWorker │────────▶│ EventStore  │
//! └──────────────┘         └──────────────┘         └─────────────┘
//!        │ cancel                 │ dispatch
//!        ▼                        ▼
//! ┌──────────────┐         ┌──────────────┐  sync   ┌─────────────┐
//! │ Cancellation │         │  Dispatcher  │────────▶│  Adapters   │
//! │    Token     │         └──────────────┘         └─────────────┘
//! └──────────────┘
//! ```

use std::sync::Arc;

use staffsync_core::Clock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    dispatcher::Dispatcher,
    error::{DeliveryError, Result},
    storage::EventStore,
    worker::{CycleReport, EngineStats, OutboxWorker, WorkerConfig},
};

/// Owns the outbox worker task.
pub struct OutboxEngine {
    worker: Arc<OutboxWorker>,
    config: WorkerConfig,
    handle: Option<JoinHandle<()>>,
}

impl OutboxEngine {
    /// Creates an engine; nothing runs until [`start`](Self::start).
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<Dispatcher>,
        config: WorkerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let worker = Arc::new(OutboxWorker::new(0, store, dispatcher, config.clone(), clock));
        Self { worker, config, handle: None }
    }

    /// Spawns the poll loop.
    ///
    /// Returns immediately. Use `shutdown()` to stop gracefully, or drop the
    /// engine to cancel the worker.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the engine is already
    /// running or was shut down.
    pub async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(DeliveryError::configuration("outbox engine already started"));
        }
        if self.worker.cancellation_token().is_cancelled() {
            return Err(DeliveryError::configuration("outbox engine was shut down"));
        }

        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.retry_policy.max_attempts,
            "starting outbox engine"
        );

        let worker = self.worker.clone();
        self.handle = Some(tokio::spawn(async move { worker.run().await }));

        Ok(())
    }

    /// Whether the poll loop has been spawned and has not finished.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the poll loop and waits for the current cycle to finish.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if the worker does not stop in time and
    /// `WorkerPanic` if its task panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down outbox engine");
        self.worker.cancellation_token().cancel();

        let Some(handle) = self.handle.take() else {
            info!("outbox engine was not started, shutdown completed immediately");
            return Ok(());
        };

        let timeout = self.config.shutdown_timeout;
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                info!("outbox engine shutdown completed");
                Ok(())
            },
            Ok(Err(join_error)) => {
                error!(error = %join_error, "outbox worker task panicked");
                Err(DeliveryError::WorkerPanic { worker_id: 0, error: join_error.to_string() })
            },
            Err(_elapsed) => {
                error!(timeout_ms = timeout.as_millis() as u64, "outbox worker shutdown timed out");
                Err(DeliveryError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        self.worker.stats().await
    }

    /// Runs one poll cycle on the engine's worker.
    ///
    /// Shares the re-entrancy guard with the background loop, so calling
    /// this while a cycle is running returns a skipped report.
    ///
    /// # Errors
    ///
    /// Returns error if the due batch cannot be fetched.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        self.worker.poll_once().await
    }
}

impl Drop for OutboxEngine {
    fn drop(&mut self) {
        let token = self.worker.cancellation_token();
        if self.handle.as_ref().is_some_and(|h| !h.is_finished()) && !token.is_cancelled() {
            error!("OutboxEngine dropped while running, forcing cancellation");
            token.cancel();
            warn!("call shutdown() before dropping the engine to let the current cycle finish");
        }
    }
}
