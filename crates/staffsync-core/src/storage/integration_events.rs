//! Repository for integration event database operations.
//!
//! Claiming is optimistic: a worker reads a due batch without locking and
//! then moves each event into `PROCESSING` with a conditional update that
//! only matches while the stored status is still the one it read. Two
//! workers racing for the same row cannot both see `rows_affected() == 1`.
//!
//! A claim holds a lease stored in `next_run_at`. If the claiming worker
//! never records an outcome, the event becomes due again once the lease
//! runs out and the next poll reclaims it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::{
    error::{CoreError, Result},
    models::{
        EventId, EventPage, EventStatus, IntegrationEvent, NewIntegrationEvent, ReplayFilter,
        StatusCounts,
    },
};

const COLUMNS: &str = "id, entity_type, entity_id, action, payload, status, attempts, \
                       last_error, next_run_at, created_at, processed_at";

/// Statements creating the event table and its indexes, in order.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS integration_events (
        id BIGSERIAL PRIMARY KEY,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        action TEXT NOT NULL CHECK (action IN ('CREATE', 'UPDATE', 'DELETE')),
        payload JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL DEFAULT 'PENDING'
            CHECK (status IN ('PENDING', 'PROCESSING', 'SUCCESS', 'FAILED', 'DEAD')),
        attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
        last_error TEXT,
        next_run_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        processed_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_integration_events_status ON integration_events(status)",
    "CREATE INDEX IF NOT EXISTS idx_integration_events_next_run ON integration_events(next_run_at)",
    "CREATE INDEX IF NOT EXISTS idx_integration_events_created ON integration_events(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_integration_events_entity ON integration_events(entity_type)",
];

/// Repository for integration event database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Appends a new `PENDING` event.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(
        &self,
        event: &NewIntegrationEvent,
        now: DateTime<Utc>,
    ) -> Result<IntegrationEvent> {
        self.create_impl(&*self.pool, event, now).await
    }

    async fn create_impl<'e, E>(
        &self,
        executor: E,
        event: &NewIntegrationEvent,
        now: DateTime<Utc>,
    ) -> Result<IntegrationEvent>
    where
        E: Executor<'e, Database = Postgres>,
    {
        event.validate()?;

        let created = sqlx::query_as::<_, IntegrationEvent>(&format!(
            r#"
            INSERT INTO integration_events (
                entity_type, entity_id, action, payload, status, attempts, created_at
            ) VALUES ($1, $2, $3, $4, 'PENDING', 0, $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(event.action.as_str())
        .bind(&event.payload)
        .bind(now)
        .fetch_one(executor)
        .await?;

        Ok(created)
    }

    /// Returns up to `limit` claimable events that are due at `now`, oldest
    /// first. Includes `PROCESSING` events whose claim lease has expired.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_due(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<IntegrationEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let events = sqlx::query_as::<_, IntegrationEvent>(&format!(
            r#"
            SELECT {COLUMNS} FROM integration_events
            WHERE (status IN ('PENDING', 'FAILED') AND (next_run_at IS NULL OR next_run_at <= $1))
               OR (status = 'PROCESSING' AND next_run_at <= $1)
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(events)
    }

    /// Moves an event into `PROCESSING` under a lease ending at
    /// `lease_until`, if its stored status still equals `expected` and it is
    /// due at `now`.
    ///
    /// Returns `false` when another worker won the race.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn try_claim(
        &self,
        event_id: EventId,
        expected: EventStatus,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE integration_events
            SET status = 'PROCESSING', next_run_at = $4
            WHERE id = $1 AND status = $2
              AND ((status <> 'PROCESSING' AND (next_run_at IS NULL OR next_run_at <= $3))
                OR (status = 'PROCESSING' AND next_run_at <= $3))
            "#,
        )
        .bind(event_id)
        .bind(expected.as_str())
        .bind(now)
        .bind(lease_until)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Marks an event as synced everywhere.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_success(&self, event_id: EventId, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE integration_events
            SET status = 'SUCCESS', processed_at = $2, last_error = NULL, next_run_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed attempt.
    ///
    /// With a `next_run_at` the event becomes `FAILED` and waits for that
    /// time; without one it is dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_failed_or_dead(
        &self,
        event_id: EventId,
        attempts: i32,
        error: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let status = if next_run_at.is_some() { EventStatus::Failed } else { EventStatus::Dead };

        sqlx::query(
            r#"
            UPDATE integration_events
            SET status = $2, attempts = $3, last_error = $4, next_run_at = $5
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(status.as_str())
        .bind(attempts)
        .bind(error)
        .bind(next_run_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds an event by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, event_id: EventId) -> Result<Option<IntegrationEvent>> {
        let event = sqlx::query_as::<_, IntegrationEvent>(&format!(
            "SELECT {COLUMNS} FROM integration_events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }

    /// Lists events newest first, optionally restricted to one status.
    ///
    /// # Errors
    ///
    /// Returns error if either query fails.
    pub async fn list(
        &self,
        status: Option<EventStatus>,
        page: u32,
        limit: u32,
    ) -> Result<EventPage> {
        let status = status.map(EventStatus::as_str);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM integration_events WHERE ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&*self.pool)
        .await?;

        let events = sqlx::query_as::<_, IntegrationEvent>(&format!(
            r#"
            SELECT {COLUMNS} FROM integration_events
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status)
        .bind(i64::from(limit))
        .bind(EventPage::offset(page, limit))
        .fetch_all(&*self.pool)
        .await?;

        Ok(EventPage::new(events, total, page, limit))
    }

    /// Counts events per status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_status(&self) -> Result<StatusCounts> {
        let rows: Vec<(EventStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM integration_events GROUP BY status",
        )
        .fetch_all(&*self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.record(status, count);
        }
        Ok(counts)
    }

    /// Resets one event to a fresh `PENDING` state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `ConstraintViolation` while a
    /// worker holds an unexpired claim on the event.
    pub async fn reset_one(&self, event_id: EventId, now: DateTime<Utc>) -> Result<IntegrationEvent> {
        let reset = sqlx::query_as::<_, IntegrationEvent>(&format!(
            r#"
            UPDATE integration_events
            SET status = 'PENDING', attempts = 0, last_error = NULL, next_run_at = NULL
            WHERE id = $1 AND (status <> 'PROCESSING' OR next_run_at <= $2)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(event_id)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await?;

        match reset {
            Some(event) => Ok(event),
            None => match self.find_by_id(event_id).await? {
                Some(_) => Err(CoreError::ConstraintViolation(format!(
                    "event {event_id} is being processed"
                ))),
                None => Err(CoreError::NotFound(format!("event {event_id} not found"))),
            },
        }
    }

    /// Resets every `DEAD` event to `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn reset_all_dead(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE integration_events
            SET status = 'PENDING', attempts = 0, last_error = NULL, next_run_at = NULL
            WHERE status = 'DEAD'
            "#,
        )
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Resets every event matching `filter` to `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn replay(&self, filter: &ReplayFilter) -> Result<u64> {
        let mut query = replay_query(filter);
        let result = query.build().execute(&*self.pool).await?;

        Ok(result.rows_affected())
    }
}

fn replay_query(filter: &ReplayFilter) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new(
        "UPDATE integration_events \
         SET status = 'PENDING', attempts = 0, last_error = NULL, next_run_at = NULL \
         WHERE status IN (",
    );

    let mut statuses = query.separated(", ");
    for status in filter.statuses() {
        statuses.push_bind(status.as_str());
    }
    statuses.push_unseparated(")");

    if let Some(entity_type) = &filter.entity_type {
        query.push(" AND entity_type = ").push_bind(entity_type);
    }
    if let Some(entity_id) = &filter.entity_id {
        query.push(" AND entity_id = ").push_bind(entity_id);
    }
    if let Some(since) = filter.since {
        query.push(" AND created_at >= ").push_bind(since);
    }

    query
}
