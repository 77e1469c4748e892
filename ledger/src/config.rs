//! Ledger configuration.

use std::str::FromStr;
use std::time::Duration;

use multiledger_common::time::{constants, DurationExt};

/// Which backing store the ledger runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store. State is lost on exit.
    Memory,
    /// PostgreSQL through a connection pool.
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            other => Err(format!("Unknown store backend: {other}")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {other}")),
        }
    }
}

/// Database pool configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/multiledger".to_string(),
            max_connections: 10,
            acquire_timeout: constants::default_acquire_timeout().as_std(),
        }
    }
}

/// Main ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Backing store.
    pub store: StoreBackend,
    /// Database configuration, used by the postgres backend.
    pub database: DatabaseConfig,
    /// Upper bound on one deposit or withdrawal. `None` waits indefinitely.
    pub operation_timeout: Option<Duration>,
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Log format.
    pub log_format: LogFormat,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            database: DatabaseConfig::default(),
            operation_timeout: Some(constants::default_operation_timeout().as_std()),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(store) = std::env::var("LEDGER_STORE") {
            config.store = store.parse()?;
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }

        if let Ok(max) = std::env::var("LEDGER_DB_MAX_CONNECTIONS") {
            config.database.max_connections = max
                .parse()
                .map_err(|_| format!("Invalid LEDGER_DB_MAX_CONNECTIONS: {max}"))?;
        }

        if let Ok(ms) = std::env::var("LEDGER_DB_ACQUIRE_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| format!("Invalid LEDGER_DB_ACQUIRE_TIMEOUT_MS: {ms}"))?;
            config.database.acquire_timeout = Duration::from_millis(ms);
        }

        if let Ok(ms) = std::env::var("LEDGER_OPERATION_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| format!("Invalid LEDGER_OPERATION_TIMEOUT_MS: {ms}"))?;
            config.operation_timeout = Some(Duration::from_millis(ms));
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.log_format = format.parse()?;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.store == StoreBackend::Postgres && self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("Max connections must be at least 1".to_string());
        }

        if self.operation_timeout == Some(Duration::ZERO) {
            return Err("Operation timeout cannot be 0".to_string());
        }

        Ok(())
    }
}
