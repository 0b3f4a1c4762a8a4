use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::store::RetryPolicy;

pub const DEFAULT_ADMIN_GROUP: &str = "system-admins";

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub system_admin_group: String,
    pub store_timeout: Duration,
    pub store_retries: u32,
    pub store_backoff: Duration,
    pub conflict_retries: u32,
    /// Zero disables the degraded-resource scanner.
    pub degraded_scan_interval: Duration,
    pub alert_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: None,
            bind_addr: "127.0.0.1:8080".to_string(),
            db_max_connections: 8,
            system_admin_group: DEFAULT_ADMIN_GROUP.to_string(),
            store_timeout: Duration::from_millis(2000),
            store_retries: 3,
            store_backoff: Duration::from_millis(100),
            conflict_retries: 3,
            degraded_scan_interval: Duration::from_secs(300),
            alert_capacity: 256,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {e}");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(AppConfig {
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            system_admin_group: get("SYSTEM_ADMIN_GROUP").unwrap_or(defaults.system_admin_group),
            store_timeout: Duration::from_millis(parse_or(&get, "STORE_TIMEOUT_MS", 2000u64)?),
            store_retries: parse_or(&get, "STORE_RETRIES", defaults.store_retries)?,
            store_backoff: Duration::from_millis(parse_or(&get, "STORE_BACKOFF_MS", 100u64)?),
            conflict_retries: parse_or(&get, "CONFLICT_RETRIES", defaults.conflict_retries)?,
            degraded_scan_interval: Duration::from_secs(parse_or(&get, "DEGRADED_SCAN_SECS", 300u64)?),
            alert_capacity: parse_or(&get, "ALERT_CAPACITY", defaults.alert_capacity)?,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.store_timeout,
            retries: self.store_retries,
            backoff: self.store_backoff,
        }
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Malformed { key, value: raw }),
    }
}
