//! Database access layer for the integration event log.
//!
//! The repository translates between the domain model and the
//! `integration_events` table. Every state transition on an event goes
//! through it so the compare-and-swap claim stays the only way into
//! `PROCESSING`.

use std::sync::Arc;

use sqlx::PgPool;

pub mod integration_events;

use crate::error::Result;

/// Container for repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for integration event operations.
    pub integration_events: Arc<integration_events::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self { integration_events: Arc::new(integration_events::Repository::new(pool)) }
    }

    /// Creates the event table and its indexes when missing.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if any statement fails.
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.integration_events.pool();
        for statement in integration_events::SCHEMA {
            sqlx::query(statement).execute(&*pool).await?;
        }
        Ok(())
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) =
            sqlx::query_as("SELECT 1").fetch_one(&*self.integration_events.pool()).await?;

        Ok(())
    }
}
