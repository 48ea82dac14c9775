//! services/coordinator/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Deadline for resource calls to the backend. Commands are exempt
    /// because some of them (schedule generation, attendance
    /// recalculation) legitimately run long.
    pub rpc_timeout: Duration,
    /// Seed the mock backend with demo records at startup.
    pub demo_data: bool,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let rpc_timeout_str =
            std::env::var("RPC_TIMEOUT_SECS").unwrap_or_else(|_| "5".to_string());
        let rpc_timeout_secs = rpc_timeout_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "RPC_TIMEOUT_SECS".to_string(),
                format!("'{}' is not a number of seconds", rpc_timeout_str),
            )
        })?;

        let demo_data = match std::env::var("DEMO_DATA")
            .unwrap_or_else(|_| "true".to_string())
            .as_str()
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "DEMO_DATA".to_string(),
                    format!("'{}' is not a boolean", other),
                ))
            }
        };

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            log_level,
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            demo_data,
            cors_origin,
        })
    }
}
