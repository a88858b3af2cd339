// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, path::PathBuf, sync::Arc};

use serde_json::Map;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mobile_logger::{
    logger::Formatter, HostHooks, KeyValueStore, LogShipper, MemoryStore, ShipperComponents,
    ShipperConfig, SledStore,
};

mod demo;

const AGENT_LOG_LEVEL_ENV: &str = "MOBILE_LOGGER_AGENT_LOG_LEVEL";
const CONFIG_FILE_ENV: &str = "MOBILE_LOGGER_CONFIG_FILE";
const DATA_DIR_ENV: &str = "MOBILE_LOGGER_DATA_DIR";
const DEMO_ENV: &str = "MOBILE_LOGGER_DEMO";
const DB_FILE_NAME: &str = "mobile-logger.db";

#[tokio::main]
pub async fn main() {
    let log_level = env::var(AGENT_LOG_LEVEL_ENV)
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,sled=off,{}", log_level);
    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }
    debug!("Logging subsystem enabled");

    let config_file = env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
    let config = match ShipperConfig::load(config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}. Shutting down.");
            return;
        }
    };

    let hooks = Arc::new(HostHooks::new());
    let components = ShipperComponents::new(open_store()).with_hooks(Arc::clone(&hooks));

    let shipper = match LogShipper::new(config, components).await {
        Ok(shipper) => shipper,
        Err(e) => {
            error!("Error creating log shipper: {e}. Shutting down.");
            return;
        }
    };
    info!(
        "Log shipper ready device_id={} session_id={}",
        shipper.device_id(),
        shipper.session_id()
    );

    let demo = env::var(DEMO_ENV)
        .map(|val| val.to_lowercase() == "true")
        .unwrap_or(false);
    if demo {
        replay_demo(&shipper, &hooks).await;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
    }
    info!("Shutting down log shipper");
    shipper.shutdown().await;
}

/// Opens on-disk storage under `MOBILE_LOGGER_DATA_DIR`, else an ephemeral store.
fn open_store() -> Arc<dyn KeyValueStore> {
    let opened = match env::var(DATA_DIR_ENV) {
        Ok(dir) => SledStore::open(PathBuf::from(dir).join(DB_FILE_NAME)),
        Err(_) => SledStore::open_ephemeral(),
    };
    match opened {
        Ok(store) => {
            debug!("Using storage at {:?}", store.path());
            Arc::new(store)
        }
        Err(e) => {
            warn!("Unable to open storage, keeping state in memory: {e}");
            Arc::new(MemoryStore::new())
        }
    }
}

async fn replay_demo(shipper: &LogShipper, hooks: &HostHooks) {
    if !shipper.is_running() {
        if let Err(e) = shipper.start() {
            warn!("Unable to start shipper for demo: {e}");
            return;
        }
    }
    info!("Replaying sample mobile session");

    for entry in demo::sample_entries() {
        if let Err(e) = shipper.record(entry) {
            warn!("Sample log rejected: {e}");
        }
        sleep(Duration::from_millis(100)).await;
    }
    for event in demo::sample_events() {
        hooks.emit(&event);
    }
    if let Err(e) = shipper.user_action("tap", "Button Tap", "Tapped save", Map::new()) {
        warn!("Sample log rejected: {e}");
    }

    shipper.flush().await;
    let status = shipper.status();
    info!(
        "Demo complete queue_size={} failed_count={} interactions={}",
        status.queue_size, status.failed_count, status.interaction_count
    );
}
