//! Environment-driven configuration.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use stockledger_observability::LogFormat;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("DATABASE_URL is required when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_timeout: Duration,
    pub max_conflict_retries: u32,
    pub monitor_enabled: bool,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            use_persistent_stores: false,
            database_url: None,
            database_max_connections: 5,
            store_timeout: Duration::from_millis(2000),
            max_conflict_retries: 8,
            monitor_enabled: true,
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = match get("LISTEN_ADDR") {
            Some(v) => v.trim().parse().map_err(|_| invalid("LISTEN_ADDR", v, "a socket address"))?,
            None => defaults.listen_addr,
        };
        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", v)?,
            None => defaults.use_persistent_stores,
        };
        let database_url = get("DATABASE_URL");
        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => parse_positive("DATABASE_MAX_CONNECTIONS", v)?,
            None => defaults.database_max_connections,
        };
        let store_timeout = match get("STORE_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(u64::from(parse_positive("STORE_TIMEOUT_MS", v)?)),
            None => defaults.store_timeout,
        };
        let max_conflict_retries = match get("MAX_CONFLICT_RETRIES") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| invalid("MAX_CONFLICT_RETRIES", v, "a non-negative integer"))?,
            None => defaults.max_conflict_retries,
        };
        let monitor_enabled = match get("MONITOR_ENABLED") {
            Some(v) => parse_bool("MONITOR_ENABLED", v)?,
            None => defaults.monitor_enabled,
        };
        let log_format = match get("LOG_FORMAT") {
            Some(v) => v.parse().map_err(|_| invalid("LOG_FORMAT", v, "\"json\" or \"pretty\""))?,
            None => defaults.log_format,
        };

        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            listen_addr,
            use_persistent_stores,
            database_url,
            database_max_connections,
            store_timeout,
            max_conflict_retries,
            monitor_enabled,
            log_format,
        })
    }
}

fn invalid(var: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        expected,
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value, "a boolean")),
    }
}

fn parse_positive(var: &'static str, value: String) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(var, value, "a positive integer")),
    }
}
