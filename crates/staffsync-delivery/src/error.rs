//! Error types for outbox processing and adapter calls.
//!
//! Adapter failures never escape the worker: they are folded into an
//! [`AttemptResult`](crate::dispatcher::AttemptResult) and drive the retry
//! path. The variants here surface from construction, storage access and
//! engine lifecycle.

use std::time::Duration;

use staffsync_core::CoreError;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised by the delivery pipeline.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Event store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Error message from the store
        message: String,
    },

    /// Adapter raised an error instead of reporting an outcome.
    #[error("adapter {adapter} failed: {message}")]
    Adapter {
        /// Name of the failing adapter
        adapter: String,
        /// Error message
        message: String,
    },

    /// Adapter call exceeded its time budget.
    #[error("adapter {adapter} timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the slow adapter
        adapter: String,
        /// Budget that was exceeded
        timeout_ms: u64,
    },

    /// No factory is registered under this adapter name.
    #[error("unknown adapter: {name}")]
    UnknownAdapter {
        /// Requested adapter name
        name: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// Worker did not stop within the shutdown timeout.
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// Worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Identifier of the worker
        worker_id: usize,
        /// Panic description
        error: String,
    },

    /// Unexpected internal error.
    #[error("internal delivery error: {message}")]
    Internal {
        /// Internal error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Creates an adapter error.
    pub fn adapter(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter { adapter: adapter.into(), message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(adapter: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            adapter: adapter.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates an unknown adapter error.
    pub fn unknown_adapter(name: impl Into<String>) -> Self {
        Self::UnknownAdapter { name: name.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the error came from a downstream integration rather than from
    /// the pipeline itself.
    pub fn is_adapter_failure(&self) -> bool {
        matches!(self, Self::Adapter { .. } | Self::Timeout { .. })
    }
}

impl From<CoreError> for DeliveryError {
    fn from(error: CoreError) -> Self {
        Self::storage(error.to_string())
    }
}
