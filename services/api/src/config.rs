//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
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
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub routing_model: String,
    pub fallback_model: String,
    /// Base URL of the secondary provider. Defaults to the primary's.
    pub fallback_api_base: Option<String>,
    pub summary_model: String,
    pub reasoning_timeout: Duration,
    pub kv_store_path: PathBuf,
    pub maintenance_hour: u32,
    pub maintenance_minute: u32,
    pub maintenance_max_attempts: u32,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Reasoning Providers ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let routing_model = var_or("ROUTING_MODEL", "gpt-4o");
        let fallback_model = var_or("FALLBACK_MODEL", "gpt-4o-mini");
        let fallback_api_base = lookup("FALLBACK_API_BASE").filter(|v| !v.trim().is_empty());
        let summary_model = var_or("SUMMARY_MODEL", "gpt-4o-mini");
        let timeout_secs: u64 = parse_var("REASONING_TIMEOUT_SECS", var_or("REASONING_TIMEOUT_SECS", "20"))?;

        // --- Local Storage and Scheduling ---
        let kv_store_path = PathBuf::from(var_or("KV_STORE_PATH", "./data/kv.json"));
        let maintenance_hour: u32 = parse_var("MAINTENANCE_HOUR", var_or("MAINTENANCE_HOUR", "7"))?;
        let maintenance_minute: u32 = parse_var("MAINTENANCE_MINUTE", var_or("MAINTENANCE_MINUTE", "53"))?;
        if maintenance_hour > 23 || maintenance_minute > 59 {
            return Err(ConfigError::InvalidValue(
                "MAINTENANCE_HOUR/MAINTENANCE_MINUTE".to_string(),
                format!("{:02}:{:02} is not a time of day", maintenance_hour, maintenance_minute),
            ));
        }
        let maintenance_max_attempts: u32 =
            parse_var("MAINTENANCE_MAX_ATTEMPTS", var_or("MAINTENANCE_MAX_ATTEMPTS", "3"))?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            routing_model,
            fallback_model,
            fallback_api_base,
            summary_model,
            reasoning_timeout: Duration::from_secs(timeout_secs),
            kv_store_path,
            maintenance_hour,
            maintenance_minute,
            maintenance_max_attempts: maintenance_max_attempts.max(1),
            cors_origin,
        })
    }
}

fn parse_var<T>(name: &str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
