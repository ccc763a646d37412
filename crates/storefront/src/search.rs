//! Recent search terms, kept on the device.

use std::sync::Arc;

use crate::storage::{ClientStorage, StorageError, keys, load_json, store_json};

/// How many terms are remembered.
pub const MAX_RECENT_SEARCHES: usize = 5;

/// Most-recent-first list of search terms.
#[derive(Clone)]
pub struct RecentSearches {
    storage: Arc<dyn ClientStorage>,
}

impl RecentSearches {
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self { storage }
    }

    /// Stored terms, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if storage cannot be read.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(load_json(self.storage.as_ref(), keys::RECENT_SEARCHES)?.unwrap_or_default())
    }

    /// Remember `term`, moving it to the front if already present.
    ///
    /// Blank terms are ignored; matching is case-insensitive and keeps the
    /// newest spelling.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if storage cannot be read or written.
    pub fn record(&self, term: &str) -> Result<Vec<String>, StorageError> {
        let term = term.trim();
        if term.is_empty() {
            return self.list();
        }

        let mut terms = self.list()?;
        let lowered = term.to_lowercase();
        terms.retain(|t| t.to_lowercase() != lowered);
        terms.insert(0, term.to_string());
        terms.truncate(MAX_RECENT_SEARCHES);

        store_json(self.storage.as_ref(), keys::RECENT_SEARCHES, &terms)?;
        Ok(terms)
    }

    /// Forget every term.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if storage cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(keys::RECENT_SEARCHES)
    }
}
