//! Configuration management for the staffsync service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use staffsync_delivery::{AdapterSettings, RetryPolicy, WorkerConfig};

const CONFIG_FILE: &str = "staffsync.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`staffsync.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use staffsync_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections", alias = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,
    /// Minimum number of connections to maintain in the pool.
    ///
    /// Environment variable: `DATABASE_MIN_CONNECTIONS`
    #[serde(default = "default_min_connections", alias = "DATABASE_MIN_CONNECTIONS")]
    pub database_min_connections: u32,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // Outbox
    /// Route mutations through the outbox instead of syncing inline.
    ///
    /// Environment variable: `OUTBOX_ENABLED`
    #[serde(default = "default_outbox_enabled", alias = "OUTBOX_ENABLED")]
    pub outbox_enabled: bool,
    /// Events fetched per poll cycle.
    ///
    /// Environment variable: `OUTBOX_BATCH_SIZE`
    #[serde(default = "default_batch_size", alias = "OUTBOX_BATCH_SIZE")]
    pub outbox_batch_size: usize,
    /// Failed attempts before an event is dead-lettered.
    ///
    /// Environment variable: `OUTBOX_MAX_ATTEMPTS`
    #[serde(default = "default_max_attempts", alias = "OUTBOX_MAX_ATTEMPTS")]
    pub outbox_max_attempts: u32,
    /// Pause between poll cycles in milliseconds.
    ///
    /// Environment variable: `OUTBOX_POLL_INTERVAL_MS`
    #[serde(default = "default_poll_interval_ms", alias = "OUTBOX_POLL_INTERVAL_MS")]
    pub outbox_poll_interval_ms: u64,
    /// Backoff after the first failure in milliseconds.
    ///
    /// Environment variable: `OUTBOX_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms", alias = "OUTBOX_BASE_DELAY_MS")]
    pub outbox_base_delay_ms: u64,
    /// Upper bound on backoff in milliseconds.
    ///
    /// Environment variable: `OUTBOX_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "OUTBOX_MAX_DELAY_MS")]
    pub outbox_max_delay_ms: u64,
    /// Jitter fraction applied to backoff (0.0 to 1.0).
    ///
    /// Environment variable: `OUTBOX_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor", alias = "OUTBOX_JITTER_FACTOR")]
    pub outbox_jitter_factor: f64,
    /// Time budget for one adapter call in milliseconds.
    ///
    /// Environment variable: `OUTBOX_ADAPTER_TIMEOUT_MS`
    #[serde(default = "default_adapter_timeout_ms", alias = "OUTBOX_ADAPTER_TIMEOUT_MS")]
    pub outbox_adapter_timeout_ms: u64,
    /// How long a claimed event stays exclusive before another poll may
    /// reclaim it, in milliseconds.
    ///
    /// Environment variable: `OUTBOX_CLAIM_LEASE_MS`
    #[serde(default = "default_claim_lease_ms", alias = "OUTBOX_CLAIM_LEASE_MS")]
    pub outbox_claim_lease_ms: u64,
    /// Extra append attempts when enqueueing fails.
    ///
    /// Environment variable: `OUTBOX_ENQUEUE_RETRIES`
    #[serde(default = "default_enqueue_retries", alias = "OUTBOX_ENQUEUE_RETRIES")]
    pub outbox_enqueue_retries: u32,

    // Integrations
    /// Comma separated adapter names.
    ///
    /// Environment variable: `ACTIVE_INTEGRATIONS`
    #[serde(default = "default_active_integrations", alias = "ACTIVE_INTEGRATIONS")]
    pub active_integrations: String,
    /// Base URL of the payroll API.
    ///
    /// Environment variable: `PAYROLL_BASE_URL`
    #[serde(default = "default_payroll_base_url", alias = "PAYROLL_BASE_URL")]
    pub payroll_base_url: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the worker configuration.
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            batch_size: self.outbox_batch_size,
            poll_interval: Duration::from_millis(self.outbox_poll_interval_ms),
            retry_policy: self.to_retry_policy(),
            claim_lease: Duration::from_millis(self.outbox_claim_lease_ms),
            shutdown_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    /// Convert to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.outbox_max_attempts,
            base_delay: Duration::from_millis(self.outbox_base_delay_ms),
            max_delay: Duration::from_millis(self.outbox_max_delay_ms),
            jitter_factor: self.outbox_jitter_factor,
        }
    }

    /// Convert to the settings adapter factories read.
    pub fn to_adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            active: self
                .active_integrations
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            payroll_base_url: self.payroll_base_url.clone(),
            adapter_timeout: self.adapter_timeout(),
        }
    }

    /// Time budget for one adapter call.
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.outbox_adapter_timeout_ms)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns error if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database min_connections cannot exceed max_connections");
        }

        if self.outbox_batch_size == 0 {
            anyhow::bail!("outbox_batch_size must be greater than 0");
        }

        if self.outbox_poll_interval_ms == 0 {
            anyhow::bail!("outbox_poll_interval_ms must be greater than 0");
        }

        if self.outbox_max_attempts == 0 {
            anyhow::bail!("outbox_max_attempts must be greater than 0");
        }

        if self.outbox_base_delay_ms > self.outbox_max_delay_ms {
            anyhow::bail!("outbox_base_delay_ms cannot exceed outbox_max_delay_ms");
        }

        if !(0.0..=1.0).contains(&self.outbox_jitter_factor) {
            anyhow::bail!("outbox_jitter_factor must be between 0.0 and 1.0");
        }

        if self.outbox_adapter_timeout_ms == 0 {
            anyhow::bail!("outbox_adapter_timeout_ms must be greater than 0");
        }

        if self.outbox_claim_lease_ms <= self.outbox_adapter_timeout_ms {
            anyhow::bail!("outbox_claim_lease_ms must exceed outbox_adapter_timeout_ms");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            database_min_connections: default_min_connections(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            outbox_enabled: default_outbox_enabled(),
            outbox_batch_size: default_batch_size(),
            outbox_max_attempts: default_max_attempts(),
            outbox_poll_interval_ms: default_poll_interval_ms(),
            outbox_base_delay_ms: default_base_delay_ms(),
            outbox_max_delay_ms: default_max_delay_ms(),
            outbox_jitter_factor: default_jitter_factor(),
            outbox_adapter_timeout_ms: default_adapter_timeout_ms(),
            outbox_claim_lease_ms: default_claim_lease_ms(),
            outbox_enqueue_retries: default_enqueue_retries(),
            active_integrations: default_active_integrations(),
            payroll_base_url: default_payroll_base_url(),
        }
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/staffsync".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_outbox_enabled() -> bool {
    true
}

fn default_batch_size() -> usize {
    staffsync_delivery::DEFAULT_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    staffsync_delivery::DEFAULT_MAX_ATTEMPTS
}

fn default_poll_interval_ms() -> u64 {
    staffsync_delivery::DEFAULT_POLL_INTERVAL_MS
}

fn default_base_delay_ms() -> u64 {
    staffsync_delivery::DEFAULT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    staffsync_delivery::DEFAULT_MAX_DELAY_MS
}

fn default_jitter_factor() -> f64 {
    0.0
}

fn default_adapter_timeout_ms() -> u64 {
    staffsync_delivery::DEFAULT_ADAPTER_TIMEOUT_MS
}

fn default_claim_lease_ms() -> u64 {
    staffsync_delivery::DEFAULT_CLAIM_LEASE_MS
}

fn default_enqueue_retries() -> u32 {
    staffsync_delivery::DEFAULT_ENQUEUE_RETRIES
}

fn default_active_integrations() -> String {
    "payroll,badge".to_string()
}

fn default_payroll_base_url() -> String {
    "http://localhost:9090".to_string()
}
