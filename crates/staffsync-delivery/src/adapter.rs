//! Contract every downstream integration implements.
//!
//! An adapter reports a failed sync in two ways: by returning an outcome with
//! `success == false`, or by returning an error. The dispatcher treats both
//! identically. Because a partially failed event is retried as a whole,
//! `sync` must be safe to repeat for an entity it has already synced.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use staffsync_core::EntityAction;

use crate::error::Result;

/// Result reported by an adapter for one sync call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Whether the downstream system accepted the change.
    pub success: bool,
    /// Human-readable detail.
    pub message: String,
}

impl SyncOutcome {
    /// Successful sync.
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    /// Sync rejected by the downstream system.
    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Health reported by one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterHealth {
    /// Whether the downstream system is reachable.
    pub healthy: bool,
    /// Human-readable detail.
    pub message: String,
}

impl AdapterHealth {
    /// Healthy status.
    pub fn healthy(message: impl Into<String>) -> Self {
        Self { healthy: true, message: message.into() }
    }

    /// Unhealthy status.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self { healthy: false, message: message.into() }
    }
}

/// Health of one adapter, labelled with its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealthReport {
    /// Adapter name.
    pub adapter_name: String,
    /// Whether the downstream system is reachable.
    pub healthy: bool,
    /// Human-readable detail.
    pub message: String,
}

/// Downstream integration driven by the dispatcher.
#[async_trait::async_trait]
pub trait IntegrationAdapter: Send + Sync + fmt::Debug {
    /// Stable name used in configuration and logs.
    fn name(&self) -> &str;

    /// Propagates one entity mutation to the downstream system.
    ///
    /// # Errors
    ///
    /// Returns an error when the call could not be completed at all, e.g. on
    /// a network failure. A reachable system that rejects the change should
    /// return `Ok(SyncOutcome::failed(..))`.
    async fn sync(
        &self,
        entity_id: &str,
        payload: &Value,
        action: EntityAction,
    ) -> Result<SyncOutcome>;

    /// Probes the downstream system.
    ///
    /// # Errors
    ///
    /// Returns an error when the check itself could not run.
    async fn health_check(&self) -> Result<AdapterHealth>;
}
