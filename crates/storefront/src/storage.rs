//! Client-side key/value persistence.
//!
//! The engine keeps a handful of small values between sessions: the active
//! cart ID, the auth token and cached profile, a guest wishlist, and recent
//! search terms. Storage is synchronous and string-typed; JSON values go
//! through [`load_json`] / [`store_json`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Storage keys used by the engine.
pub mod keys {
    /// Active cart ID.
    pub const CART_ID: &str = "cart_id";
    /// Customer bearer token.
    pub const AUTH_TOKEN: &str = "auth_token";
    /// Cached customer profile (JSON).
    pub const AUTH_PROFILE: &str = "auth_profile";
    /// Guest wishlist (JSON array of product IDs).
    pub const WISHLIST: &str = "wishlist";
    /// Recent search terms (JSON array, newest first).
    pub const RECENT_SEARCHES: &str = "recent_searches";
}

/// Errors from client storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Synchronous string key/value store.
pub trait ClientStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and decode a JSON value.
///
/// A value that no longer decodes is logged and treated as absent, so a
/// schema change never locks a shopper out of their session.
///
/// # Errors
///
/// Returns `StorageError` if the backing store cannot be read.
pub fn load_json<T: DeserializeOwned>(
    storage: &dyn ClientStorage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key, error = %e, "Discarding undecodable stored value");
            Ok(None)
        }
    }
}

/// Encode and write a JSON value.
///
/// # Errors
///
/// Returns `StorageError` if encoding or writing fails.
pub fn store_json<T: Serialize + ?Sized>(
    storage: &dyn ClientStorage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    storage.set(key, &raw)
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-process storage, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileStorage
// =============================================================================

/// Storage backed by a single JSON object file.
///
/// The whole map is loaded on open and rewritten on every change via a
/// temp file + rename, so a crash mid-write never leaves a torn file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the state file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file exists but cannot be read or
    /// parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = values.len(), "Opened state file");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ClientStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("cartwheel-test-{}", uuid::Uuid::new_v4()))
            .join("state.json")
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(keys::CART_ID).unwrap(), None);

        storage.set(keys::CART_ID, "cart_1").unwrap();
        assert_eq!(storage.get(keys::CART_ID).unwrap().as_deref(), Some("cart_1"));

        storage.remove(keys::CART_ID).unwrap();
        storage.remove(keys::CART_ID).unwrap();
        assert_eq!(storage.get(keys::CART_ID).unwrap(), None);
    }

    #[test]
    fn test_json_helpers() {
        let storage = MemoryStorage::new();
        store_json(&storage, keys::RECENT_SEARCHES, &["linen", "shirt"]).unwrap();
        let terms: Option<Vec<String>> = load_json(&storage, keys::RECENT_SEARCHES).unwrap();
        assert_eq!(terms.unwrap(), vec!["linen".to_string(), "shirt".to_string()]);
    }

    #[test]
    fn test_load_json_discards_corrupt_value() {
        let storage = MemoryStorage::new();
        storage.set(keys::WISHLIST, "{not json").unwrap();
        let wishlist: Option<Vec<String>> = load_json(&storage, keys::WISHLIST).unwrap();
        assert!(wishlist.is_none());
    }

    #[test]
    fn test_file_storage_persists_across_opens() {
        let path = temp_state_path();

        let storage = FileStorage::open(&path).unwrap();
        storage.set(keys::CART_ID, "cart_42").unwrap();
        storage.set(keys::AUTH_TOKEN, "tok").unwrap();
        storage.remove(keys::AUTH_TOKEN).unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(keys::CART_ID).unwrap().as_deref(), Some("cart_42"));
        assert_eq!(reopened.get(keys::AUTH_TOKEN).unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let path = temp_state_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(
            FileStorage::open(&path),
            Err(StorageError::Serialization(_))
        ));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
