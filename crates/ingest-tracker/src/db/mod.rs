//! Persistent local storage.
//!
//! A string key/value store in the spirit of browser `localStorage`,
//! backed by rusqlite. Access is serialized through a `Mutex<Connection>`;
//! WAL mode lets several processes share one file, last writer wins.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

pub mod error;
pub mod kv_repo;

pub use error::DatabaseError;

/// Shared handle to the storage connection. Clones refer to the same
/// connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the storage file at `path`, creating it and its directory when
    /// missing.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let db = Self::from_connection(conn)?;

        log::info!("Local storage opened at {} ({} journal)", path.display(), mode);
        Ok(db)
    }

    /// Storage that lives only as long as the handle, for tests and
    /// throwaway trackers.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        kv_repo::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Local storage lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// `~/.ingest-tracker/data/tracker.db`, or `None` without a home directory.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ingest-tracker").join("data").join("tracker.db"))
}
