//! Environment-driven configuration.
//!
//! Environment variables:
//! - `IDHUB_DATABASE_URL` - PostgreSQL connection string
//! - `IDHUB_MAX_CONNECTIONS` - pool upper bound (default: 25)
//! - `IDHUB_MIN_CONNECTIONS` - pool lower bound (default: 5)
//! - `IDHUB_ACQUIRE_TIMEOUT_SECS` - pool acquire timeout (default: 3)

use std::env;
use std::str::FromStr;

/// Configuration for connecting to PostgreSQL.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Minimum number of pooled connections.
    pub min_connections: u32,
    /// Seconds to wait for a connection from the pool.
    pub acquire_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgresql://postgres@localhost:5432/idhub".into(),
            max_connections: 25,
            min_connections: 5,
            acquire_timeout_secs: 3,
        }
    }
}

impl Config {
    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("IDHUB_DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env_or("IDHUB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("IDHUB_MIN_CONNECTIONS", defaults.min_connections),
            acquire_timeout_secs: env_or(
                "IDHUB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
