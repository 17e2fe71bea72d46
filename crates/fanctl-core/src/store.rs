//! Persistent key-value storage abstraction.
//!
//! This module provides the storage trait that the Control API persists
//! through, implemented differently on each platform:
//! - Linux: `FileStore`, a JSON file rewritten atomically on every set
//! - ESP32: NVS (Non-Volatile Storage), see the `fanctl-esp32` crate
//! - Tests: `MemoryStore`
//!
//! Values are either 32-bit integers or short strings. Reading a key that
//! was never written is not an error: it returns `Ok(None)` and callers use
//! their default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Key holding the last commanded fan speed.
pub const KEY_FAN_SPEED: &str = "fan_speed";

/// Key holding the device name.
pub const KEY_NAME: &str = "name";

/// Key holding the saved station SSID.
pub const KEY_STA_SSID: &str = "sta_ssid";

/// Key holding the saved station password.
pub const KEY_STA_PASSWORD: &str = "sta_pass";

/// Longest key accepted by any store (NVS limit).
pub const MAX_KEY_LEN: usize = 15;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key is empty or longer than `MAX_KEY_LEN`.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Key exists but holds a value of another type.
    #[error("type mismatch for key: {0}")]
    TypeMismatch(String),

    /// Backing file could not be read or written.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Backing file is not valid.
    #[error("storage data invalid: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Platform storage is not available.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key → value storage.
///
/// Every successful `set_*` is durable once it returns. All methods are
/// synchronous to support embedded platforms.
pub trait KvStore: Send + Sync {
    /// Read an integer, `None` if the key was never written.
    fn get_int(&self, key: &str) -> Result<Option<i32>, StoreError>;

    /// Write an integer.
    fn set_int(&self, key: &str, value: i32) -> Result<(), StoreError>;

    /// Read a string, `None` if the key was never written.
    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a string.
    fn set_str(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Reject keys the device store could not hold.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
enum StoredValue {
    Int(i32),
    Str(String),
}

fn read_int(data: &BTreeMap<String, StoredValue>, key: &str) -> Result<Option<i32>, StoreError> {
    match data.get(key) {
        None => Ok(None),
        Some(StoredValue::Int(value)) => Ok(Some(*value)),
        Some(StoredValue::Str(_)) => Err(StoreError::TypeMismatch(key.to_string())),
    }
}

fn read_str(
    data: &BTreeMap<String, StoredValue>,
    key: &str,
) -> Result<Option<String>, StoreError> {
    match data.get(key) {
        None => Ok(None),
        Some(StoredValue::Str(value)) => Ok(Some(value.clone())),
        Some(StoredValue::Int(_)) => Err(StoreError::TypeMismatch(key.to_string())),
    }
}

/// In-memory store. Not durable; used for tests and simulations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get_int(&self, key: &str) -> Result<Option<i32>, StoreError> {
        validate_key(key)?;
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        read_int(&data, key)
    }

    fn set_int(&self, key: &str, value: i32) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), StoredValue::Int(value));
        Ok(())
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        read_str(&data, key)
    }

    fn set_str(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), StoredValue::Str(value.to_string()));
        Ok(())
    }
}

/// File-backed store.
///
/// The whole map lives in memory and is written to a JSON file on every
/// set. Writes go to a sibling temporary file that is flushed to disk before
/// it is renamed over the original, and the directory entry is flushed after
/// the rename, so a power cut leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: RwLock<BTreeMap<String, StoredValue>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing contents if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Opened store {} with {} keys", path.display(), data.len());

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &BTreeMap<String, StoredValue>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("tmp");

        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        sync_parent_dir(&self.path)
    }
}

/// Flush the directory entry of `path` so a rename survives a power cut.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

// Only unix lets a directory be opened for syncing.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

impl FileStore {
    fn insert(&self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let previous = data.insert(key.to_string(), value);
        if let Err(e) = self.persist(&data) {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(old) => data.insert(key.to_string(), old),
                None => data.remove(key),
            };
            tracing::error!("Failed to persist key {}: {}", key, e);
            return Err(e);
        }
        tracing::debug!("Stored {}", key);
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get_int(&self, key: &str) -> Result<Option<i32>, StoreError> {
        validate_key(key)?;
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        read_int(&data, key)
    }

    fn set_int(&self, key: &str, value: i32) -> Result<(), StoreError> {
        self.insert(key, StoredValue::Int(value))
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        read_str(&data, key)
    }

    fn set_str(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.insert(key, StoredValue::Str(value.to_string()))
    }
}
