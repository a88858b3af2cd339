// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Mobile Logger
//!
//! Client-side telemetry shipper for mobile and web apps. Records are
//! batched in memory and POSTed to an ingestion endpoint; records that could
//! not be delivered one-by-one are kept in a bounded, device-local list and
//! retried in the background.
//!
//! ## Architecture
//!
//! - [`shipper`]: the [`LogShipper`] handle, lifecycle and timers
//! - [`flusher`]: delivery over a [`flusher::LogTransport`]
//! - [`retry`]: periodic retry of the persisted failed list
//! - [`store`]: key-value persistence and the failed list
//! - [`identity`]: device and session ids
//! - [`observers`]: host event hooks
//! - [`device`]: device, memory and network facts
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mobile_logger::{LogShipper, ShipperComponents, ShipperConfig, SledStore};
//!
//! let config = ShipperConfig::from_env()?;
//! let store = Arc::new(SledStore::open("/var/lib/mobile-logger/db")?);
//! let shipper = LogShipper::new(config, ShipperComponents::new(store)).await?;
//!
//! shipper.info("User Login", "User successfully logged in", Default::default())?;
//! shipper.shutdown().await;
//! ```

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_comparisons)]

/// Configuration from defaults, a JSON file and the environment
pub mod config;

/// Device metrics providers
pub mod device;

/// Public error type
pub mod error;

/// Delivery to the ingestion endpoint
pub mod flusher;

/// HTTP client construction
pub mod http;

/// Device and session identifiers
pub mod identity;

/// Tracing event formatter
pub mod logger;

/// Host event hooks
pub mod observers;

/// Bounded in-memory record queue
pub mod queue;

/// Log record model
pub mod record;

/// Failed-entry retry loop
pub mod retry;

/// Log shipper lifecycle and batching
pub mod shipper;

/// Local persistence
pub mod store;

pub use config::{DeliveryMode, ShipperConfig};
pub use error::ShipperError;
pub use observers::{HostEvent, HostHooks, ObserverKind};
pub use record::{LogEntry, LogLevel, LogRecord};
pub use shipper::{LogShipper, ShipperComponents, ShipperStatus};
pub use store::{KeyValueStore, MemoryStore, SledStore};
