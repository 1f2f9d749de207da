//! Staffsync integration service.
//!
//! Main entry point. Loads configuration, prepares the event log, starts
//! the outbox engine and the administrative API, and coordinates graceful
//! shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use staffsync_api::{AppState, Config};
use staffsync_core::{storage::Storage, Clock, RealClock};
use staffsync_delivery::{AdapterRegistry, Dispatcher, EventStore, OutboxEngine, PostgresEventStore};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting staffsync integration service");

    let config = Config::load()?;
    let addr = config.parse_server_addr()?;
    info!(
        database_url = %config.database_url_masked(),
        server_addr = %addr,
        max_connections = config.database_max_connections,
        outbox_enabled = config.outbox_enabled,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    storage.migrate().await.context("Failed to create integration_events schema")?;
    info!("Database schema ready");

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(storage, clock.clone()));

    let registry = Arc::new(AdapterRegistry::with_builtin_adapters(config.to_adapter_settings()));
    let loaded = registry.initialize();
    if loaded == 0 {
        warn!("No integration adapters loaded, events will succeed without being synced");
    }
    info!(adapters = ?registry.adapter_names(), "Integration adapters loaded");

    let dispatcher = Arc::new(Dispatcher::new(registry, config.adapter_timeout()));

    let mut engine = OutboxEngine::new(
        store.clone(),
        dispatcher.clone(),
        config.to_worker_config(),
        clock.clone(),
    );
    if config.outbox_enabled {
        engine.start().await?;
    } else {
        info!("Outbox disabled, mutations are synced inline");
    }

    let state = AppState::new(
        store,
        dispatcher,
        config.outbox_enabled,
        config.outbox_enqueue_retries,
        clock,
    );

    info!(addr = %addr, "staffsync is ready");

    if let Err(e) = staffsync_api::start_server(
        state,
        addr,
        Duration::from_secs(config.request_timeout),
        shutdown_signal(),
    )
    .await
    {
        error!(error = %e, "Server failed");
    }

    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "Outbox engine did not stop cleanly");
    }

    db_pool.close().await;
    info!("Database connections closed");

    info!("staffsync shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,staffsync=debug,tower_http=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
