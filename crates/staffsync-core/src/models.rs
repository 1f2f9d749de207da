//! Integration event model and strongly-typed identifiers.
//!
//! An integration event is the durable record of one employee mutation that
//! must be propagated to every downstream integration. Events are appended as
//! `PENDING`, claimed by a worker, and end as `SUCCESS` or `DEAD`. Only an
//! operator replay moves a `DEAD` event back into the queue.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed event identifier.
///
/// Wraps the auto-incrementing database id so it cannot be confused with an
/// entity id, which is a free-form string owned by the domain service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Kind of domain mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityAction {
    /// Entity was created.
    Create,
    /// Entity was modified.
    Update,
    /// Entity was removed.
    Delete,
}

impl EntityAction {
    /// Returns the stored representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(CoreError::InvalidInput(format!("invalid entity action: {s}"))),
        }
    }
}

impl sqlx::Type<PgDb> for EntityAction {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EntityAction {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(s.parse()?)
    }
}

/// Event lifecycle status.
///
/// ```text
/// PENDING -> PROCESSING -> SUCCESS
///                       -> FAILED -> (backoff elapses) -> PROCESSING
///                       -> DEAD   -> (operator replay) -> PENDING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    /// Waiting for a worker to claim it.
    Pending,

    /// Claimed by exactly one worker until its lease in `next_run_at` runs
    /// out.
    Processing,

    /// Every adapter synced the entity. Terminal.
    Success,

    /// Last attempt failed; eligible again once `next_run_at` has passed.
    Failed,

    /// Retry budget exhausted. Only an operator replay revives it.
    Dead,
}

impl EventStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 5] =
        [Self::Pending, Self::Processing, Self::Success, Self::Failed, Self::Dead];

    /// Returns the stored representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Dead => "DEAD",
        }
    }

    /// Whether a worker may claim an event in this status.
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Whether an operator replay may select an event in this status.
    pub const fn is_replayable(self) -> bool {
        matches!(self, Self::Failed | Self::Dead)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "DEAD" => Ok(Self::Dead),
            _ => Err(CoreError::InvalidInput(format!("invalid event status: {s}"))),
        }
    }
}

impl sqlx::Type<PgDb> for EventStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(s.parse()?)
    }
}

/// Durable unit of integration work.
///
/// # Invariants
///
/// - `attempts` only grows while the event cycles between `PENDING` and
///   `FAILED`; a manual retry or replay is the only thing that resets it.
/// - `next_run_at` is the retry time while the event is `FAILED` and the
///   claim lease expiry while it is `PROCESSING`; otherwise it is unset.
/// - `processed_at` is set only once the event reaches `SUCCESS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    /// Database-assigned identifier.
    pub id: EventId,

    /// Kind of domain object, e.g. `employee`.
    pub entity_type: String,

    /// Identifier of the domain object, e.g. `EMP0042`.
    pub entity_id: String,

    /// Mutation that produced this event.
    pub action: EntityAction,

    /// Snapshot of the entity at enqueue time, handed to adapters verbatim.
    pub payload: serde_json::Value,

    /// Current lifecycle status.
    pub status: EventStatus,

    /// Number of failed processing attempts.
    pub attempts: i32,

    /// Message from the most recent failure.
    pub last_error: Option<String>,

    /// Earliest time a worker may claim the event again.
    pub next_run_at: Option<DateTime<Utc>>,

    /// When the event was appended.
    pub created_at: DateTime<Utc>,

    /// When the event reached `SUCCESS`.
    pub processed_at: Option<DateTime<Utc>>,
}

impl IntegrationEvent {
    /// Whether a worker polling at `now` may claim this event.
    ///
    /// A `PROCESSING` event is due again once its claim lease has expired.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_claimable() {
            self.next_run_at.is_none_or(|at| at <= now)
        } else {
            self.claim_expired(now)
        }
    }

    /// Whether this event is `PROCESSING` under a lease that ran out before
    /// `now`. A claim without a lease never expires.
    pub fn claim_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Processing && self.next_run_at.is_some_and(|at| at <= now)
    }
}

/// Data required to append a new event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIntegrationEvent {
    /// Kind of domain object.
    pub entity_type: String,
    /// Identifier of the domain object.
    pub entity_id: String,
    /// Mutation that produced the event.
    pub action: EntityAction,
    /// Entity snapshot.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewIntegrationEvent {
    /// Creates a new event description.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: EntityAction,
        payload: serde_json::Value,
    ) -> Self {
        Self { entity_type: entity_type.into(), entity_id: entity_id.into(), action, payload }
    }

    /// Convenience constructor for employee mutations.
    pub fn employee(
        entity_id: impl Into<String>,
        action: EntityAction,
        payload: serde_json::Value,
    ) -> Self {
        Self::new("employee", entity_id, action, payload)
    }

    /// Rejects blank entity identifiers.
    pub fn validate(&self) -> crate::Result<()> {
        if self.entity_type.trim().is_empty() {
            return Err(CoreError::InvalidInput("entity type must not be empty".to_string()));
        }
        if self.entity_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("entity id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Selection criteria for an operator replay.
///
/// All set predicates are combined with logical AND. `statuses` is never
/// empty and only ever contains `FAILED` and `DEAD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFilter {
    statuses: Vec<EventStatus>,
    /// Restrict to one entity type.
    pub entity_type: Option<String>,
    /// Restrict to one entity id.
    pub entity_id: Option<String>,
    /// Only events created at or after this time.
    pub since: Option<DateTime<Utc>>,
}

impl ReplayFilter {
    /// Builds a filter for the given status, defaulting to both `FAILED`
    /// and `DEAD`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for any status that cannot be replayed.
    pub fn for_status(status: Option<EventStatus>) -> crate::Result<Self> {
        let statuses = match status {
            None => vec![EventStatus::Failed, EventStatus::Dead],
            Some(status) if status.is_replayable() => vec![status],
            Some(status) => {
                return Err(CoreError::InvalidInput(format!(
                    "replay status must be FAILED or DEAD, got {status}"
                )));
            },
        };

        Ok(Self { statuses, entity_type: None, entity_id: None, since: None })
    }

    /// Restricts the filter to one entity type.
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Restricts the filter to one entity id.
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Restricts the filter to events created at or after `since`.
    #[must_use]
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Statuses the replay selects.
    pub fn statuses(&self) -> &[EventStatus] {
        &self.statuses
    }

    /// Whether `event` satisfies every predicate.
    pub fn matches(&self, event: &IntegrationEvent) -> bool {
        self.statuses.contains(&event.status)
            && self.entity_type.as_ref().is_none_or(|t| *t == event.entity_type)
            && self.entity_id.as_ref().is_none_or(|id| *id == event.entity_id)
            && self.since.is_none_or(|since| event.created_at >= since)
    }
}

impl Default for ReplayFilter {
    fn default() -> Self {
        Self {
            statuses: vec![EventStatus::Failed, EventStatus::Dead],
            entity_type: None,
            entity_id: None,
            since: None,
        }
    }
}

/// One page of events, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPage {
    /// Events on this page.
    pub events: Vec<IntegrationEvent>,
    /// Total number of events matching the query.
    pub total: i64,
    /// One-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Number of pages available.
    pub pages: u32,
}

impl EventPage {
    /// Assembles a page and derives the page count.
    pub fn new(events: Vec<IntegrationEvent>, total: i64, page: u32, limit: u32) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            let total = u64::try_from(total).unwrap_or(0);
            u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX)
        };
        Self { events, total, page, limit, pages }
    }

    /// Row offset for a one-based page.
    pub fn offset(page: u32, limit: u32) -> i64 {
        i64::from(page.saturating_sub(1)) * i64::from(limit)
    }
}

/// Number of events per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    /// Events awaiting a first claim.
    pub pending: i64,
    /// Events currently claimed.
    pub processing: i64,
    /// Successfully synced events.
    pub success: i64,
    /// Events waiting for a retry.
    pub failed: i64,
    /// Dead-lettered events.
    pub dead: i64,
}

impl StatusCounts {
    /// Adds `count` to the bucket for `status`.
    pub fn record(&mut self, status: EventStatus, count: i64) {
        match status {
            EventStatus::Pending => self.pending += count,
            EventStatus::Processing => self.processing += count,
            EventStatus::Success => self.success += count,
            EventStatus::Failed => self.failed += count,
            EventStatus::Dead => self.dead += count,
        }
    }

    /// Sum over all buckets.
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.success + self.failed + self.dead
    }
}
