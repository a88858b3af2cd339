// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log record model shipped to the ingestion endpoint.
//!
//! A [`LogRecord`] is the wire object: camelCase JSON, one per observation.
//! Callers never build records directly. They describe an observation with a
//! [`LogEntry`] and the shipper fills in identity and session context.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "app": "MyApp",
//!   "title": "User Login",
//!   "content": "User successfully logged in",
//!   "logLevel": "info",
//!   "category": "user_action",
//!   "deviceId": "device_iphone_14",
//!   "sessionId": "session_1700000000000_k3j9x0a1b",
//!   "timestamp": "2025-01-01T12:00:00Z",
//!   "action": "login",
//!   "screen": "LoginScreen",
//!   "metadata": { "sessionDuration": 1200, "interactionCount": 3 }
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::ShipperError;

/// Well-known values for [`LogRecord::category`]. The field itself is free-form.
pub mod category {
    pub const SYSTEM: &str = "system";
    pub const ERROR: &str = "error";
    pub const PERFORMANCE: &str = "performance";
    pub const USER_ACTION: &str = "user_action";
    pub const EVENT: &str = "event";
    pub const NOTIFICATION: &str = "notification";
}

/// Severity attached to every record.
///
/// Parsing is case-insensitive and accepts `warn` as an alias for `warning`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!(
                "Invalid log level '{other}'. Must be one of: error, warning, info, debug"
            )),
        }
    }
}

/// Geographic position attached to location records.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

impl Location {
    fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite() && self.accuracy.is_finite()
    }
}

/// One observation, as delivered to the ingestion endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub app: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub screen: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub device_model: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl LogRecord {
    /// Checks the boundary invariants: a title and an originating app are
    /// always present, and any location is made of finite numbers.
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.title.trim().is_empty() {
            return Err(ShipperError::InvalidRecord("title is required".to_string()));
        }
        if self.app.trim().is_empty() {
            return Err(ShipperError::InvalidRecord(
                "app identifier is required".to_string(),
            ));
        }
        if let Some(location) = &self.location {
            if !location.is_finite() {
                return Err(ShipperError::InvalidRecord(
                    "location coordinates must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Caller-supplied description of an observation.
///
/// Unset optional fields fall back to shipper defaults when the record is
/// built: the configured level, category `event`, action `log`, screen
/// `Unknown`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogEntry {
    pub title: String,
    pub content: String,
    pub level: Option<LogLevel>,
    pub category: Option<String>,
    pub action: Option<String>,
    pub screen: Option<String>,
    pub metadata: Map<String, Value>,
    pub duration: Option<u64>,
    pub memory_usage: Option<String>,
    pub network_status: Option<String>,
    pub error_code: Option<String>,
    pub error_stack: Option<String>,
    pub error_context: Option<String>,
    pub location: Option<Location>,
}

impl LogEntry {
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn screen(mut self, screen: impl Into<String>) -> Self {
        self.screen = Some(screen.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Adds a single metadata key, overwriting any previous value.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn duration(mut self, duration_ms: u64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn memory_usage(mut self, memory_usage: impl Into<String>) -> Self {
        self.memory_usage = Some(memory_usage.into());
        self
    }

    #[must_use]
    pub fn network_status(mut self, network_status: impl Into<String>) -> Self {
        self.network_status = Some(network_status.into());
        self
    }

    #[must_use]
    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn error_stack(mut self, stack: impl Into<String>) -> Self {
        self.error_stack = Some(stack.into());
        self
    }

    #[must_use]
    pub fn error_context(mut self, context: impl Into<String>) -> Self {
        self.error_context = Some(context.into());
        self
    }

    #[must_use]
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    pub(crate) fn sample_record(title: &str) -> LogRecord {
        LogRecord {
            app: "TestApp".to_string(),
            title: title.to_string(),
            content: "content".to_string(),
            log_level: LogLevel::Info,
            category: category::EVENT.to_string(),
            device_id: "device-1".to_string(),
            user_id: "user-1".to_string(),
            session_id: "session-1".to_string(),
            timestamp: datetime!(2025-01-01 12:00:00 UTC),
            action: "log".to_string(),
            screen: "Unknown".to_string(),
            app_version: "1.0.0".to_string(),
            os_version: "test-os".to_string(),
            device_model: "test-device".to_string(),
            metadata: Map::new(),
            duration: None,
            memory_usage: None,
            network_status: None,
            error_code: None,
            error_stack: None,
            error_context: None,
            location: None,
        }
    }

    #[test]
    fn test_log_level_from_str_case_insensitive() {
        assert_eq!(LogLevel::from_str("ERROR").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warn").unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::from_str(" Warning ").unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert!(LogLevel::from_str("verbose").is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let mut record = sample_record("Network Error");
        record.log_level = LogLevel::Error;
        record.error_code = Some("NETWORK_TIMEOUT".to_string());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["logLevel"], json!("error"));
        assert_eq!(value["deviceId"], json!("device-1"));
        assert_eq!(value["errorCode"], json!("NETWORK_TIMEOUT"));
        assert_eq!(value["timestamp"], json!("2025-01-01T12:00:00Z"));
        // unset optionals are omitted entirely
        assert!(value.get("duration").is_none());
        assert!(value.get("location").is_none());
    }

    #[test]
    fn test_record_deserializes_with_missing_optional_fields() {
        let raw = json!({
            "app": "MyApp",
            "title": "App Backgrounded",
            "timestamp": "2025-01-01T12:00:00Z"
        });
        let record: LogRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.title, "App Backgrounded");
        assert_eq!(record.log_level, LogLevel::Info);
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_title() {
        let record = sample_record("   ");
        let err = record.validate().unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_validate_rejects_missing_app() {
        let mut record = sample_record("T");
        record.app = String::new();
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_location() {
        let mut record = sample_record("T");
        record.location = Some(Location {
            latitude: f64::NAN,
            longitude: 0.0,
            accuracy: 10.0,
        });
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new("Image Load", "Profile image loaded")
            .level(LogLevel::Info)
            .category(category::PERFORMANCE)
            .action("load_image")
            .duration(1250)
            .meta("cacheHit", false);

        assert_eq!(entry.duration, Some(1250));
        assert_eq!(entry.category.as_deref(), Some("performance"));
        assert_eq!(entry.metadata.get("cacheHit"), Some(&json!(false)));
    }
}
