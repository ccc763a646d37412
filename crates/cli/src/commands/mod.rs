//! Command implementations.
//!
//! Each command drives one engine operation, prints its result as JSON on
//! stdout, and logs any notices the engine published.

pub mod account;
pub mod cart;
pub mod saved;

use cartwheel_storefront::cart::Notice;
use cartwheel_storefront::storage::StorageError;
use cartwheel_storefront::{ConfigError, SyncError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{}", .0.user_message())]
    Sync(#[from] SyncError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No password given (use --password or CW_PASSWORD)")]
    MissingPassword,

    #[error("No saved address with ID {0}")]
    UnknownAddress(String),
}

/// Print `value` as pretty JSON.
///
/// # Errors
///
/// Returns `CommandError::Json` if `value` cannot be encoded.
#[allow(clippy::print_stdout)]
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Log every notice published since `notices` subscribed.
pub fn drain_notices(notices: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice {
            Notice::Success(message) => tracing::info!("{message}"),
            Notice::Error(message) => tracing::warn!("{message}"),
        }
    }
}
