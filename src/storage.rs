//! Storage layer for taskboard
//!
//! All state lives in a local key-value store. Values are JSON-encoded
//! strings; keys are flat names shared under one namespace.
//!
//! # Directory Structure
//!
//! ```text
//! <data-dir>/
//!   taskboard.toml              # Optional configuration
//!   <namespace>/                # Persistent state (default: taskboard/)
//!     tasks.json                # Array of tasks
//!     tasks_next_id.json        # Next task id ("4")
//!     users.json                # Array of users
//!     users_next_id.json        # Next user id
//!   session/                    # Session-scoped state, cleared on logout
//!     auth_token.json
//!     current_user.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};

/// Default namespace for persistent keys
pub const DEFAULT_NAMESPACE: &str = "taskboard";

/// Directory holding session-scoped keys
pub const SESSION_DIR: &str = "session";

/// Configuration file name inside the data directory
pub const CONFIG_FILE: &str = "taskboard.toml";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "TASKBOARD_DATA_DIR";

/// Synchronous string key-value store.
///
/// Implementations may fail on write (quota, IO); reads of missing keys
/// return `Ok(None)`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Serialize `value` as JSON and store it under `key`.
pub fn write_json<T: Serialize + ?Sized>(kv: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    kv.set(key, &json)
}

/// Read and deserialize the JSON value under `key`.
pub fn read_json<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match kv.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("storage key cannot be empty".to_string()));
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(Error::InvalidArgument(format!(
            "invalid storage key '{key}' (expected [A-Za-z0-9_-])"
        )));
    }
    Ok(())
}

pub(crate) fn lock_or_recover<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =========================================================================
// Data directory
// =========================================================================

/// Resolved data directory and the paths derived from it
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `explicit` if given, otherwise the platform data directory.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }
        let dirs = directories::ProjectDirs::from("", "", "taskboard").ok_or_else(|| {
            Error::InvalidConfig(format!(
                "cannot determine a data directory; pass --data-dir or set {DATA_DIR_ENV}"
            ))
        })?;
        Ok(Self::new(dirs.data_dir()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for persistent keys of `namespace`
    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace)
    }

    /// Directory for session-scoped keys
    pub fn session_dir(&self) -> PathBuf {
        self.root.join(SESSION_DIR)
    }

    /// Path to the configuration file
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}

// =========================================================================
// File-backed store
// =========================================================================

/// One file per key (`<dir>/<key>.json`), written atomically under a lock
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock_timeout_ms: u64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`
    pub fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Create the backing directory
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        lock::read_locked_str(self.key_path(key), self.lock_timeout_ms)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        lock::write_atomic_locked(self.key_path(key), value.as_bytes(), self.lock_timeout_ms)
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        lock::remove_locked(self.key_path(key), self.lock_timeout_ms)
    }
}

// =========================================================================
// In-memory store
// =========================================================================

/// In-memory store with an optional byte quota over keys and values
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the stored bytes past `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota: Some(bytes),
        }
    }

    /// Bytes currently used (key and value lengths)
    pub fn used_bytes(&self) -> usize {
        lock_or_recover(&self.entries)
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }

    pub fn keys(&self) -> Vec<String> {
        lock_or_recover(&self.entries).keys().cloned().collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(lock_or_recover(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let mut entries = lock_or_recover(&self.entries);
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        lock_or_recover(&self.entries).remove(key);
        Ok(())
    }
}
