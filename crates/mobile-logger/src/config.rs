// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipper configuration.
//!
//! Configuration sources are applied in the following order (later sources
//! override earlier):
//!
//! 1. **Defaults** - [`ShipperConfig::default`]
//! 2. **JSON file** - optional, passed to [`ShipperConfig::load`]
//! 3. **Environment variables** - `MOBILE_LOGGER_*` (highest priority)
//!
//! Keys are the snake_case field names, so `MOBILE_LOGGER_BATCH_SIZE=20`
//! sets `batch_size`. The HTTPS proxy is read from the unprefixed
//! `HTTPS_PROXY` when no prefixed value is given.

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::record::LogLevel;

/// Prefix for every environment variable read by [`ShipperConfig::from_env`].
pub const ENV_PREFIX: &str = "MOBILE_LOGGER_";

/// Path appended to `endpoint_url` for log delivery.
pub const LOGS_PATH: &str = "/logs";

const DEFAULT_ENDPOINT_URL: &str = "http://localhost:3000/api";
const DEFAULT_APP: &str = "Mobile App";
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_BATCH_INTERVAL_MS: u64 = 5_000;
const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How records leave the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Queue records and ship them in batches (size or interval triggered).
    #[default]
    Batched,
    /// Ship every record on its own as soon as it is recorded.
    Immediate,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "batched" | "batch" => Ok(DeliveryMode::Batched),
            "immediate" | "single" => Ok(DeliveryMode::Immediate),
            other => Err(format!(
                "Invalid delivery mode '{other}'. Must be one of: batched, immediate"
            )),
        }
    }
}

/// Options recognised by the shipper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Base URL of the ingestion endpoint; records are POSTed to `{endpoint_url}/logs`.
    pub endpoint_url: String,
    /// Originating app identifier stamped on every record.
    pub app: String,
    /// User id attached to every record.
    pub user_id: String,
    /// Level used when a [`crate::record::LogEntry`] does not set one.
    #[serde(deserialize_with = "deserialize_from_str")]
    pub log_level: LogLevel,
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Milliseconds between scheduled flushes.
    pub batch_interval_ms: u64,
    /// Per-request delivery timeout in seconds.
    pub flush_timeout_secs: u64,
    /// Upper bound on queued records; oldest are evicted beyond it.
    pub max_queue_size: usize,
    #[serde(deserialize_with = "deserialize_from_str")]
    pub delivery: DeliveryMode,
    pub capture_errors: bool,
    pub capture_performance: bool,
    pub capture_interactions: bool,
    pub capture_location: bool,
    pub capture_notifications: bool,
    /// Start the shipper as soon as it is constructed.
    pub auto_start: bool,
    pub https_proxy: Option<String>,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            app: DEFAULT_APP.to_string(),
            user_id: String::new(),
            log_level: LogLevel::Info,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
            flush_timeout_secs: DEFAULT_FLUSH_TIMEOUT_SECS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            delivery: DeliveryMode::Batched,
            capture_errors: true,
            capture_performance: true,
            capture_interactions: true,
            capture_location: false,
            capture_notifications: true,
            auto_start: true,
            https_proxy: None,
        }
    }
}

impl ShipperConfig {
    /// Create configuration from defaults and `MOBILE_LOGGER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Create configuration from defaults, an optional JSON file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ShipperConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let mut config: ShipperConfig = figment.extract()?;
        if config.https_proxy.is_none() {
            config.https_proxy = env::var("HTTPS_PROXY").ok().filter(|p| !p.is_empty());
        }
        config.endpoint_url = config.endpoint_url.trim().to_string();

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "endpoint_url cannot be empty".to_string(),
            ));
        }
        if !self.endpoint_url.starts_with("http://") && !self.endpoint_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "endpoint_url must be an http(s) URL, got '{}'",
                self.endpoint_url
            )));
        }
        if self.app.trim().is_empty() {
            return Err(ConfigError::Invalid("app cannot be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "batch_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.flush_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "flush_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_queue_size < self.batch_size {
            return Err(ConfigError::Invalid(format!(
                "max_queue_size ({}) must be at least batch_size ({})",
                self.max_queue_size, self.batch_size
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    #[must_use]
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    /// Full URL records are delivered to.
    #[must_use]
    pub fn logs_url(&self) -> String {
        format!("{}{}", self.endpoint_url.trim_end_matches('/'), LOGS_PATH)
    }
}

fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = String::deserialize(deserializer)?;
    T::from_str(&value).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for key in [
            "MOBILE_LOGGER_ENDPOINT_URL",
            "MOBILE_LOGGER_APP",
            "MOBILE_LOGGER_BATCH_SIZE",
            "MOBILE_LOGGER_BATCH_INTERVAL_MS",
            "MOBILE_LOGGER_LOG_LEVEL",
            "MOBILE_LOGGER_DELIVERY",
            "MOBILE_LOGGER_CAPTURE_LOCATION",
            "MOBILE_LOGGER_AUTO_START",
            "MOBILE_LOGGER_HTTPS_PROXY",
            "HTTPS_PROXY",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ShipperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_interval(), Duration::from_millis(5000));
        assert!(!config.capture_location);
        assert!(config.auto_start);
    }

    #[test]
    fn test_logs_url_trims_trailing_slash() {
        let config = ShipperConfig {
            endpoint_url: "https://ingest.example.com/api/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.logs_url(), "https://ingest.example.com/api/logs");
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = ShipperConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_endpoint() {
        let config = ShipperConfig {
            endpoint_url: "   ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_endpoint() {
        let config = ShipperConfig {
            endpoint_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_queue_smaller_than_batch() {
        let config = ShipperConfig {
            batch_size: 20,
            max_queue_size: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides_defaults() {
        clear_env();
        env::set_var("MOBILE_LOGGER_ENDPOINT_URL", "https://ingest.example.com");
        env::set_var("MOBILE_LOGGER_BATCH_SIZE", "25");
        env::set_var("MOBILE_LOGGER_LOG_LEVEL", "DEBUG");
        env::set_var("MOBILE_LOGGER_DELIVERY", "immediate");
        env::set_var("MOBILE_LOGGER_CAPTURE_LOCATION", "true");

        let config = ShipperConfig::from_env().unwrap();
        assert_eq!(config.endpoint_url, "https://ingest.example.com");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.delivery, DeliveryMode::Immediate);
        assert!(config.capture_location);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_reads_unprefixed_proxy() {
        clear_env();
        env::set_var("HTTPS_PROXY", "http://proxy.local:3128");

        let config = ShipperConfig::from_env().unwrap();
        assert_eq!(
            config.https_proxy.as_deref(),
            Some("http://proxy.local:3128")
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_level_is_error() {
        clear_env();
        env::set_var("MOBILE_LOGGER_LOG_LEVEL", "loud");

        assert!(ShipperConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_merges_json_file_under_env() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"app": "FileApp", "batch_size": 5, "auto_start": false}}"#
        )
        .unwrap();
        env::set_var("MOBILE_LOGGER_BATCH_SIZE", "7");

        let config = ShipperConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.app, "FileApp");
        assert!(!config.auto_start);
        // environment wins over the file
        assert_eq!(config.batch_size, 7);

        clear_env();
    }
}
