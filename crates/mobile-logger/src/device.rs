// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Device and platform facts attached to records.
//!
//! The shipper never probes the platform directly. It asks a
//! [`DeviceMetricsProvider`], which has one real implementation per target
//! ([`SystemMetricsProvider`] for desktop and server hosts) and a fixed one
//! for tests ([`StaticMetricsProvider`]).

use std::fs;

use serde::Serialize;
use sysinfo::{Networks, System};

const BYTES_PER_MB: u64 = 1024 * 1024;
const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Static description of the device and the app running on it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: String,
    pub brand: String,
    pub model: String,
    pub system_name: String,
    pub system_version: String,
    pub app_version: String,
    pub device_name: String,
}

/// Memory figures in megabytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub used: u64,
    pub total: u64,
    pub available: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub is_connected: bool,
}

/// Source of device, memory and network facts.
pub trait DeviceMetricsProvider: Send + Sync {
    /// Short platform name used in generated ids (`linux`, `ios`, `web`, ...).
    fn platform(&self) -> String;

    /// A platform-provided id that is unique to this device, if there is one.
    fn unique_id(&self) -> Option<String>;

    fn device_info(&self) -> DeviceInfo;

    fn memory_info(&self) -> MemoryInfo;

    fn network_info(&self) -> NetworkInfo;
}

/// Reads facts from the host operating system.
#[derive(Clone, Debug)]
pub struct SystemMetricsProvider {
    app_version: String,
}

impl SystemMetricsProvider {
    #[must_use]
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
        }
    }
}

impl Default for SystemMetricsProvider {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl DeviceMetricsProvider for SystemMetricsProvider {
    fn platform(&self) -> String {
        std::env::consts::OS.to_string()
    }

    fn unique_id(&self) -> Option<String> {
        MACHINE_ID_PATHS.iter().find_map(|path| {
            fs::read_to_string(path)
                .ok()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
        })
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            platform: self.platform(),
            brand: System::name().unwrap_or_default(),
            model: std::env::consts::ARCH.to_string(),
            system_name: System::name().unwrap_or_default(),
            system_version: System::os_version().unwrap_or_default(),
            app_version: self.app_version.clone(),
            device_name: System::host_name().unwrap_or_default(),
        }
    }

    fn memory_info(&self) -> MemoryInfo {
        let mut system = System::new();
        system.refresh_memory();
        MemoryInfo {
            used: system.used_memory() / BYTES_PER_MB,
            total: system.total_memory() / BYTES_PER_MB,
            available: system.available_memory() / BYTES_PER_MB,
        }
    }

    fn network_info(&self) -> NetworkInfo {
        let networks = Networks::new_with_refreshed_list();
        let is_connected = networks.iter().any(|(name, _)| name != "lo");
        NetworkInfo {
            kind: if is_connected { "ethernet" } else { "none" }.to_string(),
            is_connected,
        }
    }
}

/// Returns the same facts on every call.
#[derive(Clone, Debug)]
pub struct StaticMetricsProvider {
    pub unique_id: Option<String>,
    pub device: DeviceInfo,
    pub memory: MemoryInfo,
    pub network: NetworkInfo,
}

impl Default for StaticMetricsProvider {
    fn default() -> Self {
        Self {
            unique_id: None,
            device: DeviceInfo {
                platform: "test".to_string(),
                brand: "TestBrand".to_string(),
                model: "TestModel".to_string(),
                system_name: "TestOS".to_string(),
                system_version: "1.0".to_string(),
                app_version: "1.0.0".to_string(),
                device_name: "test-device".to_string(),
            },
            memory: MemoryInfo {
                used: 64,
                total: 1024,
                available: 512,
            },
            network: NetworkInfo {
                kind: "wifi".to_string(),
                is_connected: true,
            },
        }
    }
}

impl DeviceMetricsProvider for StaticMetricsProvider {
    fn platform(&self) -> String {
        self.device.platform.clone()
    }

    fn unique_id(&self) -> Option<String> {
        self.unique_id.clone()
    }

    fn device_info(&self) -> DeviceInfo {
        self.device.clone()
    }

    fn memory_info(&self) -> MemoryInfo {
        self.memory
    }

    fn network_info(&self) -> NetworkInfo {
        self.network.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_is_deterministic() {
        let provider = StaticMetricsProvider::default();
        assert_eq!(provider.memory_info(), provider.memory_info());
        assert_eq!(provider.platform(), "test");
        assert_eq!(provider.unique_id(), None);
    }

    #[test]
    fn test_network_info_serializes_type_key() {
        let info = NetworkInfo {
            kind: "wifi".to_string(),
            is_connected: true,
        };
        let value = serde_json::to_value(info).unwrap();
        assert_eq!(value["type"], "wifi");
        assert_eq!(value["isConnected"], true);
    }

    #[test]
    fn test_system_provider_reports_platform_and_memory() {
        let provider = SystemMetricsProvider::new("2.0.0");
        assert_eq!(provider.platform(), std::env::consts::OS);
        let info = provider.device_info();
        assert_eq!(info.app_version, "2.0.0");
        let memory = provider.memory_info();
        assert!(memory.used <= memory.total || memory.total == 0);
    }
}
