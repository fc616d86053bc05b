//! # Server Configuration
//!
//! Every setting comes from a `DOCBRIDGE_*` environment variable and falls back
//! to the built-in default when unset or empty.
//!
//! | Variable | Default |
//! |---|---|
//! | `DOCBRIDGE_ADDR` | `0.0.0.0:8080` |
//! | `DOCBRIDGE_BACKLOG` | `3` |
//! | `DOCBRIDGE_MAX_CONNECTIONS` | `1` |
//! | `DOCBRIDGE_REQUEST_TIMEOUT_MS` | `30000` |
//! | `DOCBRIDGE_MAX_HEAD_BYTES` | `8192` |
//! | `DOCBRIDGE_MAX_BODY_BYTES` | `1048576` |
//! | `DOCBRIDGE_STORE` | `memory` |
//! | `DOCBRIDGE_DATABASE` | `my_database` |
//! | `DOCBRIDGE_COLLECTION` | `my_collection` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use docbridge_store::{StoreBackend, StoreConfig};

use crate::protocol::ParseLimits;
use crate::server::{DEFAULT_BACKLOG, ServerSettings};

/// Default listen address: all interfaces, fixed port.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Configuration errors reported at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Complete process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub backlog: i32,
    pub settings: ServerSettings,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backlog: DEFAULT_BACKLOG,
            settings: ServerSettings::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Config::default();

        let listen_addr = parse_or("DOCBRIDGE_ADDR", get("DOCBRIDGE_ADDR"), defaults.listen_addr)?;
        let backlog = parse_or("DOCBRIDGE_BACKLOG", get("DOCBRIDGE_BACKLOG"), defaults.backlog)?;
        if backlog < 1 {
            return Err(invalid("DOCBRIDGE_BACKLOG", backlog, "must be at least 1"));
        }

        let max_connections = parse_or(
            "DOCBRIDGE_MAX_CONNECTIONS",
            get("DOCBRIDGE_MAX_CONNECTIONS"),
            defaults.settings.max_connections,
        )?;
        if max_connections == 0 || max_connections > u32::MAX as usize {
            return Err(invalid(
                "DOCBRIDGE_MAX_CONNECTIONS",
                max_connections,
                "must be between 1 and 4294967295",
            ));
        }

        let timeout_ms = parse_or(
            "DOCBRIDGE_REQUEST_TIMEOUT_MS",
            get("DOCBRIDGE_REQUEST_TIMEOUT_MS"),
            defaults.settings.request_timeout.as_millis() as u64,
        )?;
        if timeout_ms == 0 {
            return Err(invalid("DOCBRIDGE_REQUEST_TIMEOUT_MS", timeout_ms, "must be positive"));
        }

        let limits = ParseLimits {
            max_head_bytes: parse_or(
                "DOCBRIDGE_MAX_HEAD_BYTES",
                get("DOCBRIDGE_MAX_HEAD_BYTES"),
                defaults.settings.limits.max_head_bytes,
            )?,
            max_body_bytes: parse_or(
                "DOCBRIDGE_MAX_BODY_BYTES",
                get("DOCBRIDGE_MAX_BODY_BYTES"),
                defaults.settings.limits.max_body_bytes,
            )?,
        };

        let backend = match get("DOCBRIDGE_STORE") {
            Some(raw) => raw
                .parse::<StoreBackend>()
                .map_err(|err| invalid("DOCBRIDGE_STORE", &raw, err))?,
            None => defaults.store.backend,
        };

        Ok(Config {
            listen_addr,
            backlog,
            settings: ServerSettings {
                max_connections,
                request_timeout: Duration::from_millis(timeout_ms),
                limits,
            },
            store: StoreConfig {
                backend,
                database: get("DOCBRIDGE_DATABASE").unwrap_or(defaults.store.database),
                collection: get("DOCBRIDGE_COLLECTION").unwrap_or(defaults.store.collection),
            },
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|err| invalid(key, &raw, err)),
        None => Ok(default),
    }
}

fn invalid(
    key: &'static str,
    value: impl std::fmt::Display,
    reason: impl std::fmt::Display,
) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
