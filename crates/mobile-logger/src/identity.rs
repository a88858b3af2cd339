// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Device and session identifiers.

use rand::Rng;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::device::DeviceMetricsProvider;
use crate::store::{KeyValueStore, DEVICE_ID_KEY};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_SUFFIX_LEN: usize = 9;

/// Returns the installation's device id, creating and persisting one on first use.
///
/// Storage problems never fail the caller: an unreadable store yields an id
/// that lives for this process only, and a failed write keeps the generated id
/// for this process.
pub fn load_or_create_device_id(
    store: &dyn KeyValueStore,
    provider: &dyn DeviceMetricsProvider,
) -> String {
    match store.get(DEVICE_ID_KEY) {
        Ok(Some(id)) if !id.trim().is_empty() => {
            debug!("STORE | Loaded device id {}", id);
            return id;
        }
        Ok(_) => {}
        Err(e) => {
            let id = fallback_device_id(&provider.platform());
            warn!(
                "STORE | Could not read device id, using ephemeral id {}: {}",
                id, e
            );
            return id;
        }
    }

    let id = provider
        .unique_id()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| fallback_device_id(&provider.platform()));

    if let Err(e) = store.set(DEVICE_ID_KEY, &id) {
        warn!("STORE | Could not persist device id {}: {}", id, e);
    } else {
        debug!("STORE | Created device id {}", id);
    }
    id
}

/// A fresh per-construction session id; never persisted.
#[must_use]
pub fn new_session_id() -> String {
    format!("session_{}_{}", unix_millis(), random_suffix())
}

fn fallback_device_id(platform: &str) -> String {
    format!("{}_{}_{}", platform, unix_millis(), random_suffix())
}

fn unix_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StaticMetricsProvider;
    use crate::store::tests::FlakyStore;
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;

    fn assert_random_suffix(s: &str) {
        assert_eq!(s.len(), RANDOM_SUFFIX_LEN);
        assert!(s.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_session_id_format() {
        let id = new_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i128>().is_ok());
        assert_random_suffix(parts[2]);
    }

    #[test]
    fn test_session_ids_differ() {
        assert_ne!(new_session_id(), new_session_id());
    }

    #[test]
    fn test_device_id_generated_then_reused() {
        let store = MemoryStore::new();
        let provider = StaticMetricsProvider::default();

        let first = load_or_create_device_id(&store, &provider);
        assert!(first.starts_with("test_"));
        assert_random_suffix(first.rsplit('_').next().unwrap());
        assert_eq!(store.get(DEVICE_ID_KEY).unwrap().as_deref(), Some(first.as_str()));

        let second = load_or_create_device_id(&store, &provider);
        assert_eq!(first, second);
    }

    #[test]
    fn test_device_id_prefers_platform_unique_id() {
        let store = MemoryStore::new();
        let provider = StaticMetricsProvider {
            unique_id: Some("hw-1234".to_string()),
            ..Default::default()
        };
        assert_eq!(load_or_create_device_id(&store, &provider), "hw-1234");
        assert_eq!(store.get(DEVICE_ID_KEY).unwrap().as_deref(), Some("hw-1234"));
    }

    #[test]
    fn test_device_id_unreadable_store_is_ephemeral() {
        let store = FlakyStore::broken();
        let provider = StaticMetricsProvider {
            unique_id: Some("hw-1234".to_string()),
            ..Default::default()
        };
        let id = load_or_create_device_id(&store, &provider);
        assert!(id.starts_with("test_"));

        store.broken.store(false, Ordering::SeqCst);
        assert_eq!(store.get(DEVICE_ID_KEY).unwrap(), None);
    }

    #[test]
    fn test_device_id_kept_when_write_fails() {
        let store = FlakyStore::default();
        store.inner.set("unrelated", "x").unwrap();
        let provider = StaticMetricsProvider::default();
        // reads succeed, writes fail
        struct ReadOnly<'a>(&'a FlakyStore);
        impl KeyValueStore for ReadOnly<'_> {
            fn get(&self, key: &str) -> Result<Option<String>, crate::store::StoreError> {
                self.0.get(key)
            }
            fn set(&self, _: &str, _: &str) -> Result<(), crate::store::StoreError> {
                Err(crate::store::StoreError::Unavailable("read-only".into()))
            }
        }
        let id = load_or_create_device_id(&ReadOnly(&store), &provider);
        assert!(id.starts_with("test_"));
        assert_eq!(store.get(DEVICE_ID_KEY).unwrap(), None);
    }
}
