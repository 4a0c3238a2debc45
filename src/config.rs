//! Configuration module

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

/// Rejected configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("BATCH_SIZE must be greater than zero")]
    ZeroBatchSize,

    #[error("POLL_INTERVAL_SECS must be greater than zero")]
    ZeroPollInterval,

    #[error("DB_MAX_CONNECTIONS must be greater than zero")]
    ZeroConnections,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Full connection URL, takes precedence over the discrete parts below
    pub database_url: Option<String>,

    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,

    /// Pool size
    pub db_max_connections: u32,

    /// How long a single connection acquisition may take
    pub db_acquire_timeout: Duration,

    /// Path to the model artifact
    pub model_path: PathBuf,

    /// Optional expected SHA-256 of the model artifact (hex)
    pub model_sha256: Option<String>,

    /// Idle wait when the batch is empty or the store is unreachable
    pub poll_interval: Duration,

    /// Pause after every iteration, whatever its outcome
    pub settle_delay: Duration,

    /// Readings fetched per batch
    pub batch_size: u32,

    /// Skips before a reading is quarantined (0 disables quarantine)
    pub max_record_attempts: u32,

    /// Ensure table and index exist at startup
    pub run_migrations: bool,

    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_host: "127.0.0.1".to_string(),
            db_port: 5432,
            db_name: "safe_db".to_string(),
            db_user: "postgres".to_string(),
            db_password: String::new(),
            db_max_connections: 2,
            db_acquire_timeout: Duration::from_secs(5),
            model_path: PathBuf::from("safe_anomaly_model_multidevice.json"),
            model_sha256: None,
            poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            batch_size: 100,
            max_record_attempts: 5,
            run_migrations: true,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to
    /// defaults for anything missing or unparsable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),

            db_host: lookup("DB_HOST").unwrap_or(defaults.db_host),

            db_port: lookup("DB_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.db_port),

            db_name: lookup("DB_NAME").unwrap_or(defaults.db_name),

            db_user: lookup("DB_USER").unwrap_or(defaults.db_user),

            db_password: lookup("DB_PASSWORD").unwrap_or(defaults.db_password),

            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.db_max_connections),

            db_acquire_timeout: parsed("DB_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.db_acquire_timeout),

            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),

            model_sha256: lookup("MODEL_SHA256")
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),

            poll_interval: parsed("POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),

            settle_delay: parsed("SETTLE_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.settle_delay),

            batch_size: lookup("BATCH_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.batch_size),

            max_record_attempts: lookup("MAX_RECORD_ATTEMPTS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_record_attempts),

            run_migrations: lookup("RUN_MIGRATIONS")
                .map(|s| s.to_lowercase() != "false" && s != "0")
                .unwrap_or(defaults.run_migrations),

            log_format: match lookup("LOG_FORMAT").map(|s| s.to_lowercase()).as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }

    /// Reject values the scoring loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }
        Ok(())
    }

    /// Postgres connection options. `DATABASE_URL` wins when set and valid.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        if let Some(url) = &self.database_url {
            return PgConnectOptions::from_str(url);
        }

        Ok(PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .database(&self.db_name)
            .username(&self.db_user)
            .password(&self.db_password))
    }

    /// Connection target safe for logging (no credentials)
    pub fn database_label(&self) -> String {
        match &self.database_url {
            Some(url) => url.split('@').last().unwrap_or("***").to_string(),
            None => format!("{}:{}/{}", self.db_host, self.db_port, self.db_name),
        }
    }
}
