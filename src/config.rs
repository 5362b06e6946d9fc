use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in .env file or environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// JSON file holding the array of projects
    pub projects_file: PathBuf,

    /// Directory for rolling log files
    /// Default: logs
    pub log_dir: PathBuf,

    /// Maximum size of a specification fetched from a URL (in bytes)
    /// Default: 10MB (10 * 1024 * 1024)
    pub max_spec_size: usize,

    /// Timeout for fetching a remote specification
    /// Default: 30 seconds
    pub fetch_timeout: Duration,

    /// Buffered events per subscriber before the slowest one lags
    /// Default: 256
    pub event_channel_capacity: usize,

    /// Reported in job statistics
    /// Default: the crate version
    pub template_version: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Required environment variables:
    /// - PROJECTS_FILE: path of the JSON project store
    ///
    /// Optional environment variables:
    /// - LOG_DIR (default: logs)
    /// - MAX_SPEC_SIZE: bytes (default: 10485760 = 10MB)
    /// - FETCH_TIMEOUT_SECS (default: 30)
    /// - EVENT_CHANNEL_CAPACITY (default: 256)
    /// - TEMPLATE_VERSION (default: crate version)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let projects_file = lookup("PROJECTS_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("PROJECTS_FILE"))?;

        let log_dir = lookup("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));

        let max_spec_size = parse_or(&lookup, "MAX_SPEC_SIZE", 10 * 1024 * 1024)?;
        let fetch_timeout_secs: u64 = parse_or(&lookup, "FETCH_TIMEOUT_SECS", 30)?;
        let event_channel_capacity = parse_or(&lookup, "EVENT_CHANNEL_CAPACITY", 256)?;

        let template_version = lookup("TEMPLATE_VERSION")
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        Ok(Config {
            projects_file,
            log_dir,
            max_spec_size,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            event_channel_capacity,
            template_version,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
