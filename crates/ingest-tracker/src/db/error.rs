//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the local storage database.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating the database directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored value could not be (de)serialized.
    #[error("Invalid value stored under '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to apply storage schema v{version}: {reason}")]
    Schema { version: u32, reason: String },
}
