//! Operator controls that put events back in the queue.
//!
//! Every operation resets the selected events to `PENDING` with no attempts,
//! no error and no schedule, so the next poll cycle picks them up.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use staffsync_core::{CoreError, EventId, EventStatus, IntegrationEvent, ReplayFilter, Result};
use tracing::info;

use crate::storage::EventStore;

/// Replay selection as submitted by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    /// `FAILED` or `DEAD`; both when absent.
    pub status: Option<String>,
    /// Restrict to one entity type.
    pub entity_type: Option<String>,
    /// Restrict to one entity id.
    pub entity_id: Option<String>,
    /// Only events created in the last `from_days` days.
    pub from_days: Option<u32>,
    /// Only events created at or after this time. Takes precedence over
    /// `from_days`.
    pub from_date: Option<DateTime<Utc>>,
}

impl ReplayRequest {
    /// Resolves the request into a filter relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown or non-replayable status, or a
    /// `from_days` window that reaches outside the representable calendar.
    pub fn into_filter(self, now: DateTime<Utc>) -> Result<ReplayFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<EventStatus>()?),
        };

        let mut filter = ReplayFilter::for_status(status)?;
        if let Some(entity_type) = self.entity_type.filter(|s| !s.trim().is_empty()) {
            filter = filter.with_entity_type(entity_type);
        }
        if let Some(entity_id) = self.entity_id.filter(|s| !s.trim().is_empty()) {
            filter = filter.with_entity_id(entity_id);
        }

        let since = match (self.from_date, self.from_days) {
            (Some(date), _) => Some(date),
            (None, Some(days)) => Some(
                TimeDelta::try_days(i64::from(days))
                    .and_then(|window| now.checked_sub_signed(window))
                    .ok_or_else(|| {
                        CoreError::InvalidInput(format!("fromDays {days} is out of range"))
                    })?,
            ),
            (None, None) => None,
        };
        if let Some(since) = since {
            filter = filter.with_since(since);
        }

        Ok(filter)
    }
}

/// Operator-facing retry and replay operations.
pub struct ReplayService {
    store: Arc<dyn EventStore>,
}

impl ReplayService {
    /// Creates a replay service over `store`.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Resets one event.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `ConstraintViolation` while
    /// the event is being processed.
    pub async fn retry_one(&self, event_id: EventId) -> Result<IntegrationEvent> {
        let event = self.store.reset_one(event_id).await?;
        info!(event_id = %event_id, "integration event reset for retry");
        Ok(event)
    }

    /// Resets every dead-lettered event. Returns the number affected.
    ///
    /// # Errors
    ///
    /// Returns error if the store update fails.
    pub async fn retry_all_dead(&self) -> Result<u64> {
        let count = self.store.reset_all_dead().await?;
        info!(count, "dead integration events reset for retry");
        Ok(count)
    }

    /// Resets every event matching `filter`. Returns the number affected.
    ///
    /// # Errors
    ///
    /// Returns error if the store update fails.
    pub async fn replay(&self, filter: ReplayFilter) -> Result<u64> {
        let count = self.store.replay(filter.clone()).await?;
        info!(
            count,
            statuses = ?filter.statuses(),
            entity_type = ?filter.entity_type,
            entity_id = ?filter.entity_id,
            since = ?filter.since,
            "integration events replayed"
        );
        Ok(count)
    }
}
