// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Device-local persisted state.
//!
//! The shipper persists two things between runs: the installation's device id
//! and the list of records that could not be delivered. Both go through the
//! small [`KeyValueStore`] trait so hosts can plug in whatever storage their
//! platform offers. [`SledStore`] is the on-disk default; [`MemoryStore`] is
//! an in-process map.
//!
//! # Failed Entry List
//!
//! [`FailedLogStore`] owns the `failed_logs` key. It is read, modified and
//! written back as one JSON blob, capped at [`MAX_FAILED_LOGS`] entries with
//! the oldest evicted first. Concurrent processes sharing one store are not
//! coordinated: the last writer wins.
//!
//! If the backing store fails, the list switches to an in-memory copy for the
//! rest of the process lifetime so the shipper keeps working.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sled::{Config as SledConfig, Db, Tree};
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::LogRecord;

/// Key holding the persisted device id.
pub const DEVICE_ID_KEY: &str = "device_id";
/// Key holding the JSON array of [`FailedLogEntry`].
pub const FAILED_LOGS_KEY: &str = "failed_logs";
/// Maximum number of failed entries kept; older ones are evicted first.
pub const MAX_FAILED_LOGS: usize = 50;

/// Tree holding every shipper key inside the sled database.
const SHIPPER_TREE: &str = "mobile_logger";

/// Errors emitted by [`KeyValueStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Minimal string key-value storage the shipper persists into.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Makes prior writes durable. Writes may be buffered until then.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Sled-backed store, on disk or in memory.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    tree: Tree,
    path: PathBuf,
}

impl SledStore {
    /// Opens (or creates) a store at the provided path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // sled does not create intermediate directories automatically.
                fs::create_dir_all(parent)?;
            }
        }

        let db = SledConfig::new().path(&path).open()?;
        let tree = db.open_tree(SHIPPER_TREE)?;
        Ok(Self { db, tree, path })
    }

    /// Opens an in-memory store (ephemeral across restarts).
    pub fn open_ephemeral() -> Result<Self, StoreError> {
        let db = SledConfig::new().temporary(true).open()?;
        let tree = db.open_tree(SHIPPER_TREE)?;
        Ok(Self {
            db,
            tree,
            path: PathBuf::new(),
        })
    }

    /// Returns the filesystem path backing the store.
    ///
    /// Ephemeral stores return an empty path because data resides in memory only.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tree
            .get(key.as_bytes())?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    /// Blocks until pending writes reach disk.
    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Process-local store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A record that could not be delivered, plus how many retries it has failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLogEntry {
    #[serde(flatten)]
    pub record: LogRecord,
    #[serde(default)]
    pub retry_count: u32,
}

impl FailedLogEntry {
    #[must_use]
    pub fn new(record: LogRecord) -> Self {
        Self {
            record,
            retry_count: 0,
        }
    }
}

/// Typed access to the persisted failed-entry list.
pub struct FailedLogStore {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<FailedState>,
}

#[derive(Default)]
struct FailedState {
    /// Last list successfully read or written.
    cached: Vec<FailedLogEntry>,
    /// Set once the backing store has failed; `cached` is then authoritative.
    ephemeral: bool,
}

impl FailedLogStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: Mutex::new(FailedState::default()),
        }
    }

    /// Reads the current list. Unreadable contents are treated as empty.
    pub fn load(&self) -> Vec<FailedLogEntry> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        self.read_locked(&mut state);
        state.cached.clone()
    }

    /// Replaces the persisted list, keeping only the newest [`MAX_FAILED_LOGS`].
    pub fn save(&self, entries: Vec<FailedLogEntry>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        self.write_locked(&mut state, entries);
    }

    /// Read-modify-write of the list under one lock, so concurrent appends in
    /// this process are not lost.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Vec<FailedLogEntry>),
    {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        self.read_locked(&mut state);
        let mut entries = std::mem::take(&mut state.cached);
        f(&mut entries);
        self.write_locked(&mut state, entries);
    }

    /// Appends a fresh entry for `record`, evicting the oldest beyond the cap.
    pub fn append(&self, record: LogRecord) {
        self.update(|entries| {
            entries.push(FailedLogEntry::new(record));
            debug!(
                "STORE | Stored failed log for retry ({} pending)",
                entries.len().min(MAX_FAILED_LOGS)
            );
        });
    }

    fn read_locked(&self, state: &mut FailedState) {
        if state.ephemeral {
            return;
        }
        match self.store.get(FAILED_LOGS_KEY) {
            Ok(None) => state.cached = Vec::new(),
            Ok(Some(raw)) => match serde_json::from_str::<Vec<FailedLogEntry>>(&raw) {
                Ok(entries) => state.cached = entries,
                Err(e) => {
                    warn!("STORE | Discarding unreadable failed log list: {}", e);
                    state.cached = Vec::new();
                }
            },
            Err(e) => {
                warn!(
                    "STORE | Failed log storage unavailable, keeping failed logs in memory: {}",
                    e
                );
                state.ephemeral = true;
            }
        }
    }

    fn write_locked(&self, state: &mut FailedState, mut entries: Vec<FailedLogEntry>) {
        truncate_oldest(&mut entries);
        if !state.ephemeral {
            let result = serde_json::to_string(&entries)
                .map_err(StoreError::from)
                .and_then(|raw| self.store.set(FAILED_LOGS_KEY, &raw));
            if let Err(e) = result {
                warn!(
                    "STORE | Failed log storage unavailable, keeping failed logs in memory: {}",
                    e
                );
                state.ephemeral = true;
            }
        }
        state.cached = entries;
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the backing store has failed and the list now lives in memory.
    pub fn is_ephemeral(&self) -> bool {
        self.state.lock().map(|s| s.ephemeral).unwrap_or(true)
    }
}

fn truncate_oldest(entries: &mut Vec<FailedLogEntry>) {
    if entries.len() > MAX_FAILED_LOGS {
        let excess = entries.len() - MAX_FAILED_LOGS;
        entries.drain(..excess);
    }
}
