//! Integration event endpoints.
//!
//! Operators list events and push failed or dead-lettered ones back into
//! the queue. The domain service posts mutations to `POST /events`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use staffsync_core::{EventId, EventPage, EventStatus, IntegrationEvent, NewIntegrationEvent};
use staffsync_delivery::{AttemptResult, PublishOutcome, ReplayRequest};
use tracing::{debug, info, instrument};

use crate::{
    error::{ApiError, Result},
    AppState,
};

/// Page size when none is requested.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query parameters for `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Optional status filter, case-insensitive.
    pub status: Option<String>,
    /// One-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

/// Body returned by bulk operations.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountResponse {
    /// Number of events affected.
    pub count: u64,
}

/// Lists events newest first.
///
/// # Errors
///
/// Returns 400 for an unknown status.
#[instrument(name = "list_events", skip(state))]
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<EventPage>> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<EventStatus>()?),
    };
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let events = state.store.list_events(status, page, limit).await?;
    debug!(total = events.total, returned = events.events.len(), "events listed");

    Ok(Json(events))
}

/// Resets one event to `PENDING`.
///
/// # Errors
///
/// Returns 404 for an unknown id and 409 while the event is being
/// processed.
#[instrument(name = "retry_event", skip(state))]
pub async fn retry_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<IntegrationEvent>> {
    let event = state.replay.retry_one(EventId(event_id)).await?;
    Ok(Json(event))
}

/// Resets every dead-lettered event.
///
/// # Errors
///
/// Returns 500 if the store update fails.
#[instrument(name = "retry_dead_events", skip(state))]
pub async fn retry_dead_events(State(state): State<AppState>) -> Result<Json<CountResponse>> {
    let count = state.replay.retry_all_dead().await?;
    Ok(Json(CountResponse { count }))
}

/// Resets failed and dead-lettered events matching the request body.
///
/// An empty body replays every failed and dead-lettered event.
///
/// # Errors
///
/// Returns 400 for a malformed body or a non-replayable status.
#[instrument(name = "replay_events", skip(state, body), fields(body_len = body.len()))]
pub async fn replay_events(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CountResponse>> {
    let request: ReplayRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReplayRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid replay request: {e}")))?
    };

    let filter = request.into_filter(state.clock.now_utc())?;
    let count = state.replay.replay(filter).await?;

    Ok(Json(CountResponse { count }))
}

/// Accepts a domain mutation for propagation.
///
/// Responds `202 Accepted` with the stored event when the outbox is enabled.
/// Otherwise the mutation is synced inline and the per-adapter results are
/// returned with `200 OK`.
///
/// # Errors
///
/// Returns 400 for a malformed event and 500 if the append fails.
#[instrument(
    name = "publish_event",
    skip(state, event),
    fields(entity_type = %event.entity_type, entity_id = %event.entity_id, action = %event.action)
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Json(event): Json<NewIntegrationEvent>,
) -> Result<Response> {
    match state.publisher.publish(event).await? {
        PublishOutcome::Queued(event) => {
            info!(event_id = %event.id, "mutation queued");
            Ok((StatusCode::ACCEPTED, Json(json!({ "mode": "outbox", "event": event })))
                .into_response())
        },
        PublishOutcome::Synced(result) => {
            let outcomes: Vec<_> = result
                .outcomes
                .iter()
                .map(|outcome| match &outcome.result {
                    AttemptResult::Success => json!({ "adapter": outcome.adapter, "success": true }),
                    AttemptResult::Failure(message) => {
                        json!({ "adapter": outcome.adapter, "success": false, "message": message })
                    },
                })
                .collect();

            Ok(Json(json!({
                "mode": "direct",
                "success": result.success,
                "message": result.message,
                "outcomes": outcomes,
            }))
            .into_response())
        },
    }
}

/// Returns event counts per status.
///
/// # Errors
///
/// Returns 500 if the store query fails.
#[instrument(name = "event_stats", skip(state))]
pub async fn event_stats(State(state): State<AppState>) -> Result<Response> {
    let counts = state.store.count_by_status().await?;
    Ok(Json(json!({ "counts": counts, "total": counts.total() })).into_response())
}
