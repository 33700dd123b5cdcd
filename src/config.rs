// src/config.rs
use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
#[error("invalid value for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub frontend_url: String,
    pub public_url: Option<String>,
    pub subscriber_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            database_url: None,
            db_max_connections: 5,
            frontend_url: "http://localhost:3000".to_string(),
            public_url: None,
            subscriber_buffer: 64,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self {
            port: try_load("PORT", "5000")?,
            database_url: optional("DATABASE_URL"),
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "5")?,
            frontend_url: try_load("FRONTEND_URL", "http://localhost:3000")?,
            public_url: optional("PUBLIC_URL").map(|url| url.trim_end_matches('/').to_string()),
            subscriber_buffer: try_load("SUBSCRIBER_BUFFER", "64")?,
        };

        if config.database_url.is_none() {
            warn!("DATABASE_URL not set, polls are kept in memory only");
        }

        Ok(config)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError {
            key,
            reason: e.to_string(),
        }
    })
}
