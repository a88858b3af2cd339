// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Errors surfaced by the shipper's public operations.
//!
//! Transport and storage failures are recovered internally and never reach
//! the caller of [`crate::shipper::LogShipper::record`]; only caller mistakes
//! and lifecycle misuse are returned here.

/// Errors returned from [`crate::shipper::LogShipper`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid log record: {0}")]
    InvalidRecord(String),

    #[error("Shipper already running")]
    AlreadyRunning,

    #[error("Shipper not running")]
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ShipperError::InvalidRecord("title is required".to_string());
        assert_eq!(error.to_string(), "Invalid log record: title is required");
    }

    #[test]
    fn test_error_debug() {
        let error = ShipperError::NotRunning;
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("NotRunning"));
    }

    #[test]
    fn test_lifecycle_errors_display() {
        assert_eq!(
            ShipperError::AlreadyRunning.to_string(),
            "Shipper already running"
        );
        assert_eq!(ShipperError::NotRunning.to_string(), "Shipper not running");
    }
}
