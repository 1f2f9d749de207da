//! HTTP request handlers for the staffsync API.
//!
//! Handlers are grouped by functionality:
//! - `events` - Event listing, intake, retry and replay
//! - `health` - Liveness, health and integration checks
//!
//! Failures are returned as [`ApiError`](crate::ApiError), which renders the
//! standard `{ "error": { "code", "message" } }` body.

pub mod events;
pub mod health;

pub use events::{
    event_stats, list_events, publish_event, replay_events, retry_dead_events, retry_event,
};
pub use health::{health_check, integrations_health, liveness_check};
