// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the ingestion endpoint.
//!
//! The client applies the configured flush timeout to every request and
//! routes through `https_proxy` when one is configured. An unusable proxy is
//! logged and the client falls back to a direct connection, so a bad proxy
//! setting degrades delivery instead of disabling the shipper.

use std::time::Duration;

use tracing::error;

use crate::config::ShipperConfig;

/// Creates the client used for every delivery.
#[must_use]
pub fn get_client(config: &ShipperConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "SHIPPER | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "SHIPPER | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(config: &ShipperConfig, allow_proxy: bool) -> Result<reqwest::Client, reqwest::Error> {
    let mut client = reqwest::Client::builder()
        .timeout(config.flush_timeout())
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            client = client.proxy(reqwest::Proxy::https(https_uri.as_str())?);
        }
    }

    client.build()
}
