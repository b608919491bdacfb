//! Server configuration
//!
//! All settings come from `NOTARY_SERVER_*` environment variables. Unset
//! variables fall back to their defaults; set but unparseable ones are an
//! error.

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::core::{CacheConfig, DEFAULT_CONSISTENT_MAX_AGE_SECS, DEFAULT_CURRENT_MAX_AGE_SECS};

pub const ENV_PORT: &str = "NOTARY_SERVER_PORT";
pub const ENV_LOG_LEVEL: &str = "NOTARY_SERVER_LOG_LEVEL";
pub const ENV_KEY_ALGORITHM: &str = "NOTARY_SERVER_KEY_ALGORITHM";
pub const ENV_CURRENT_MAX_AGE: &str = "NOTARY_SERVER_CURRENT_MAX_AGE_SECS";
pub const ENV_CONSISTENT_MAX_AGE: &str = "NOTARY_SERVER_CONSISTENT_MAX_AGE_SECS";
pub const ENV_DATABASE_URL: &str = "NOTARY_SERVER_DATABASE_URL";

const DEFAULT_PORT: u16 = 4443;

/// Configuration and wiring errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Dependencies missing or inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid value for {var}: {reason}")]
    Env { var: String, reason: String },
}

/// Settings for the server binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
    /// Algorithm for server-managed keys, as configured
    pub key_algorithm: String,
    pub cache: CacheConfig,
    /// PostgreSQL connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_level: "info".into(),
            key_algorithm: "ed25519".into(),
            cache: CacheConfig::default(),
            database_url: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read configuration through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            port: parse_or(&lookup, ENV_PORT, defaults.port)?,
            log_level: lookup(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            key_algorithm: lookup(ENV_KEY_ALGORITHM).unwrap_or(defaults.key_algorithm),
            cache: CacheConfig {
                current_max_age: parse_or(&lookup, ENV_CURRENT_MAX_AGE, DEFAULT_CURRENT_MAX_AGE_SECS)?,
                consistent_max_age: parse_or(
                    &lookup,
                    ENV_CONSISTENT_MAX_AGE,
                    DEFAULT_CONSISTENT_MAX_AGE_SECS,
                )?,
            },
            database_url: lookup(ENV_DATABASE_URL).filter(|url| !url.is_empty()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
            var: var.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 4443);
        assert_eq!(config.cache.current_max_age, 300);
        assert_eq!(config.cache.consistent_max_age, 2_592_000);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_PORT, "8080"),
            (ENV_LOG_LEVEL, "debug"),
            (ENV_CURRENT_MAX_AGE, "60"),
            (ENV_DATABASE_URL, "postgres://localhost/notary"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.cache.current_max_age, 60);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/notary")
        );
    }

    #[test]
    fn test_invalid_port() {
        let err = ServerConfig::from_lookup(lookup(&[(ENV_PORT, "not-a-port")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == ENV_PORT));
    }
}
