//! Core domain models for the staffsync integration pipeline.
//!
//! Provides the integration event model, strongly-typed identifiers, the
//! clock abstraction and the PostgreSQL repository that owns event identity
//! and state. The delivery and API crates build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    EntityAction, EventId, EventPage, EventStatus, IntegrationEvent, NewIntegrationEvent,
    ReplayFilter, StatusCounts,
};
pub use time::{Clock, RealClock, TestClock};
