//! Fan-out of one entity mutation to every registered adapter.
//!
//! Adapters run concurrently, each in its own task and under its own time
//! budget. An adapter that reports failure, returns an error, times out or
//! panics yields [`AttemptResult::Failure`]. The event succeeds only when no
//! adapter failed.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use staffsync_core::EntityAction;
use tracing::{debug, warn};

use crate::{error::DeliveryError, registry::AdapterRegistry};

/// Normalized result of one attempt, as seen by the retry logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// Every adapter succeeded.
    Success,
    /// At least one adapter failed, with the combined message.
    Failure(String),
}

impl AttemptResult {
    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result of one adapter within a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOutcome {
    /// Adapter name.
    pub adapter: String,
    /// What happened.
    pub result: AttemptResult,
}

/// Aggregate result of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    /// True when no adapter failed.
    pub success: bool,
    /// Summary on success, combined failure messages otherwise.
    pub message: String,
    /// Per-adapter results, in registry order.
    pub outcomes: Vec<AdapterOutcome>,
}

impl DispatchResult {
    /// Collapses the dispatch into the shape the retry logic consumes.
    pub fn attempt_result(&self) -> AttemptResult {
        if self.success {
            AttemptResult::Success
        } else {
            AttemptResult::Failure(self.message.clone())
        }
    }
}

/// Invokes every adapter in the registry for one mutation.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<AdapterRegistry>,
    adapter_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    pub fn new(registry: Arc<AdapterRegistry>, adapter_timeout: Duration) -> Self {
        Self { registry, adapter_timeout }
    }

    /// Returns the registry this dispatcher drives.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Syncs `payload` to every adapter and reduces the outcomes.
    pub async fn sync_to_all(
        &self,
        entity_id: &str,
        action: EntityAction,
        payload: &Value,
    ) -> DispatchResult {
        let adapters = self.registry.adapters();

        if adapters.is_empty() {
            warn!(entity_id, "no adapters registered, treating dispatch as successful");
            return DispatchResult {
                success: true,
                message: "no adapters registered".to_string(),
                outcomes: Vec::new(),
            };
        }

        let handles = adapters.iter().map(|adapter| {
            let adapter = adapter.clone();
            let entity_id = entity_id.to_string();
            let payload = payload.clone();
            let timeout = self.adapter_timeout;
            let name = adapter.name().to_string();

            let handle = tokio::spawn(async move {
                tokio::time::timeout(timeout, adapter.sync(&entity_id, &payload, action)).await
            });

            async move {
                let result = match handle.await {
                    Ok(Ok(Ok(outcome))) if outcome.success => AttemptResult::Success,
                    Ok(Ok(Ok(outcome))) => AttemptResult::Failure(outcome.message),
                    Ok(Ok(Err(error))) => AttemptResult::Failure(error.to_string()),
                    Ok(Err(_elapsed)) => {
                        AttemptResult::Failure(DeliveryError::timeout(&name, timeout).to_string())
                    },
                    Err(join_error) => AttemptResult::Failure(
                        DeliveryError::adapter(&name, format!("panicked: {join_error}")).to_string(),
                    ),
                };
                AdapterOutcome { adapter: name, result }
            }
        });

        let outcomes = futures::future::join_all(handles).await;

        let failures: Vec<&str> = outcomes
            .iter()
            .filter_map(|outcome| match &outcome.result {
                AttemptResult::Failure(message) => Some(message.as_str()),
                AttemptResult::Success => None,
            })
            .collect();

        for outcome in &outcomes {
            if let AttemptResult::Failure(message) = &outcome.result {
                warn!(entity_id, adapter = %outcome.adapter, error = %message, "adapter sync failed");
            }
        }

        let result = if failures.is_empty() {
            DispatchResult {
                success: true,
                message: format!("synced to {} adapter(s)", outcomes.len()),
                outcomes,
            }
        } else {
            DispatchResult { success: false, message: failures.join("; "), outcomes }
        };

        debug!(entity_id, success = result.success, "dispatch complete");
        result
    }
}
