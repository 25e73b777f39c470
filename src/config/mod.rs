//! Service configuration.
//!
//! [`Config`] is what the library consumes. [`Cli`] is the `clap` front end the
//! binary uses to build one from command-line flags and `DUETODO_*`
//! environment variables.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::background::DEFAULT_SCAN_PERIOD;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Default cap on concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Response conventions of the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ApiMode {
    /// JSON arrays for lookups, `404` for unknown ids, `400` for bad bodies.
    #[default]
    Standard,
    /// Wire-compatible with v1 clients: zero-valued records for unknown ids,
    /// concatenated objects for multi-match lookups, bad bodies tolerated.
    Legacy,
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("scan period must be greater than zero")]
    ZeroScanPeriod,

    #[error("max connections must be greater than zero")]
    ZeroMaxConnections,
}

/// Runtime settings for the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Time between notification scans.
    pub scan_period: Duration,
    /// Maximum number of connections served at once.
    pub max_connections: usize,
    /// Response conventions of the REST API.
    pub api_mode: ApiMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            scan_period: DEFAULT_SCAN_PERIOD,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            api_mode: ApiMode::default(),
        }
    }
}

impl Config {
    /// Checks the settings that would make the service unusable.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroScanPeriod`] or [`ConfigError::ZeroMaxConnections`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_period.is_zero() {
            return Err(ConfigError::ZeroScanPeriod);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }
        Ok(())
    }
}

/// In-memory todo service with due-date notifications
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long = "bind", env = "DUETODO_BIND", default_value = DEFAULT_BIND_ADDR)]
    pub bind_addr: String,

    /// Seconds between due-date notification scans
    #[arg(long, env = "DUETODO_SCAN_PERIOD_SECS", default_value_t = DEFAULT_SCAN_PERIOD.as_secs())]
    pub scan_period_secs: u64,

    /// Maximum number of connections served at once
    #[arg(long, env = "DUETODO_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Response conventions: standard, or legacy for v1 client compatibility
    #[arg(long, value_enum, env = "DUETODO_API_MODE", default_value_t = ApiMode::Standard)]
    pub api_mode: ApiMode,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Builds and validates a [`Config`] from the parsed arguments.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] reported by [`Config::validate`].
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let config = Config {
            bind_addr: self.bind_addr,
            scan_period: Duration::from_secs(self.scan_period_secs),
            max_connections: self.max_connections,
            api_mode: self.api_mode,
        };
        config.validate()?;
        Ok(config)
    }
}
