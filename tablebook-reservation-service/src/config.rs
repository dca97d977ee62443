use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rpc_addr: SocketAddr,
    pub kafka_url: Option<String>,
    pub statement_timeout_ms: u64,
}

impl Config {
    /// Reads the process environment; call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            rpc_addr: try_load("RPC_ADDR", "0.0.0.0:8110")?,
            kafka_url: env::var("KAFKA_URL").ok(),
            statement_timeout_ms: try_load("STATEMENT_TIMEOUT_MS", "5000")?,
        })
    }

    pub fn kafka_url(&self) -> Result<&str, ConfigError> {
        self.kafka_url
            .as_deref()
            .ok_or(ConfigError::Missing("KAFKA_URL"))
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        })
}
