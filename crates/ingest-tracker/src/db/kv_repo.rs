//! Key/value repository for the `local_storage` table.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Table layouts in version order. `PRAGMA user_version` holds the number
/// already applied to a database file.
const SCHEMA: &[&str] = &["CREATE TABLE IF NOT EXISTS local_storage (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"];

/// Brings the `local_storage` table up to the current layout.
pub(super) fn create_schema(conn: &Connection) -> Result<(), DatabaseError> {
    let applied: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (version, sql) in (1u32..).zip(SCHEMA).skip(applied as usize) {
        conn.execute_batch(sql)
            .map_err(|e| DatabaseError::Schema {
                version,
                reason: e.to_string(),
            })?;
        conn.pragma_update(None, "user_version", version)?;
        log::debug!("local_storage schema upgraded to v{}", version);
    }
    Ok(())
}

/// Returns the raw string stored under `key`.
pub fn get_item(db: &Database, key: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT value FROM local_storage WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Stores `value` under `key`, replacing any previous value.
pub fn set_item(db: &Database, key: &str, value: &str) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    })
}

/// Removes `key`. Returns whether a row was deleted.
pub fn remove_item(db: &Database, key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    })
}

/// Lists all keys starting with `prefix`, in key order.
pub fn keys_with_prefix(db: &Database, prefix: &str) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT key FROM local_storage WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    })
}

/// Reads and deserializes a JSON value stored under `key`.
pub fn get_json<T: DeserializeOwned>(db: &Database, key: &str) -> Result<Option<T>, DatabaseError> {
    match get_item(db, key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| DatabaseError::Serde {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serializes `value` as JSON and stores it under `key`.
pub fn set_json<T: Serialize + ?Sized>(db: &Database, key: &str, value: &T) -> Result<(), DatabaseError> {
    let raw = serde_json::to_string(value).map_err(|source| DatabaseError::Serde {
        key: key.to_string(),
        source,
    })?;
    set_item(db, key, &raw)
}
