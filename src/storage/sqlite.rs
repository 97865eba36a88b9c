//! `SQLite`-backed durable storage.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use super::{StorageBackend, prefix_upper_bound};
use crate::{Error, Result};

/// `SQLite` key/range backend, the durable store for layers and audit.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`.
/// `SQLite`'s WAL mode and `busy_timeout` pragma mitigate contention:
///
/// - **WAL mode**: allows concurrent readers with a single writer
/// - **`busy_timeout`**: waits up to 5 seconds for locks instead of failing
/// - **NORMAL synchronous**: balances durability with performance
pub struct SqliteBackend {
    /// Protected by Mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database file (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let backend = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        backend.initialize()?;
        Ok(backend)
    }

    /// Creates an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_sqlite_in_memory".to_string(),
            cause: e.to_string(),
        })?;

        let backend = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        backend.initialize()?;
        Ok(backend)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "initialize_schema".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }
}

impl StorageBackend for SqliteBackend {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "sqlite_put".to_string(),
            cause: e.to_string(),
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::OperationFailed {
            operation: "sqlite_get".to_string(),
            cause: e.to_string(),
        })
    }

    fn get_range(&self, prefix: &str, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = acquire_lock(&self.conn);
        let limit_param = i64::try_from(limit).unwrap_or(i64::MAX);
        let map_err = |e: rusqlite::Error| Error::OperationFailed {
            operation: "sqlite_get_range".to_string(),
            cause: e.to_string(),
        };

        let mut rows = Vec::new();
        match prefix_upper_bound(prefix) {
            Some(upper) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT key, value FROM kv_store
                         WHERE key >= ?1 AND key < ?2
                         ORDER BY key DESC LIMIT ?3",
                    )
                    .map_err(map_err)?;
                let mapped = stmt
                    .query_map(params![prefix, upper, limit_param], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(map_err)?;
                for row in mapped {
                    rows.push(row.map_err(map_err)?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT key, value FROM kv_store
                         WHERE key >= ?1
                         ORDER BY key DESC LIMIT ?2",
                    )
                    .map_err(map_err)?;
                let mapped = stmt
                    .query_map(params![prefix, limit_param], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(map_err)?;
                for row in mapped {
                    rows.push(row.map_err(map_err)?);
                }
            }
        }
        Ok(rows)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let affected = conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .map_err(|e| Error::OperationFailed {
                operation: "sqlite_delete".to_string(),
                cause: e.to_string(),
            })?;
        Ok(affected > 0)
    }

    fn count_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let map_err = |e: rusqlite::Error| Error::OperationFailed {
            operation: "sqlite_count_prefix".to_string(),
            cause: e.to_string(),
        };

        let count: i64 = match prefix_upper_bound(prefix) {
            Some(upper) => conn
                .query_row(
                    "SELECT COUNT(*) FROM kv_store WHERE key >= ?1 AND key < ?2",
                    params![prefix, upper],
                    |row| row.get(0),
                )
                .map_err(map_err)?,
            None => conn
                .query_row(
                    "SELECT COUNT(*) FROM kv_store WHERE key >= ?1",
                    params![prefix],
                    |row| row.get(0),
                )
                .map_err(map_err)?,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Acquires the connection lock with poison recovery.
///
/// If the mutex is poisoned by a panic in a previous critical section, the
/// inner connection is still valid; recover it and note the event.
fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("sqlite mutex was poisoned, recovering");
            metrics::counter!("stratacog_sqlite_poison_recovery_total").increment(1);
            poisoned.into_inner()
        }
    }
}

/// Applies the connection pragmas.
///
/// `pragma_update` returns the pragma's result row (e.g. `journal_mode`
/// reports the mode as a string), which is not an error; ignore it.
fn configure_connection(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_round_trip() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.put("memory/s1/live/0001", "hello").unwrap();
        assert_eq!(
            backend.get("memory/s1/live/0001").unwrap(),
            Some("hello".to_string())
        );
        assert_eq!(backend.get("missing").unwrap(), None);
    }

    #[test]
    fn test_put_replaces_existing() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.put("k", "first").unwrap();
        backend.put("k", "second").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some("second".to_string()));
    }

    #[test]
    fn test_get_range_descending_and_bounded() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.put("memory/s1/live/0001", "a").unwrap();
        backend.put("memory/s1/live/0002", "b").unwrap();
        backend.put("memory/s1/live/0003", "c").unwrap();
        backend.put("session/s1", "marker").unwrap();

        let rows = backend.get_range("memory/s1/", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "memory/s1/live/0003");
        assert_eq!(rows[1].0, "memory/s1/live/0002");
    }

    #[test]
    fn test_get_range_excludes_sibling_prefixes() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.put("audit/s1/0001", "a").unwrap();
        backend.put("audit/s10/0001", "b").unwrap();

        let rows = backend.get_range("audit/s1/", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "a");
    }

    #[test]
    fn test_delete_reports_existence() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.put("k", "v").unwrap();
        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
    }

    #[test]
    fn test_count_prefix() {
        let backend = SqliteBackend::in_memory().unwrap();
        for i in 0..4 {
            backend.put(&format!("audit/s1/{i:04}"), "v").unwrap();
        }
        backend.put("audit/s2/0000", "v").unwrap();
        assert_eq!(backend.count_prefix("audit/s1/").unwrap(), 4);
    }

    #[test]
    fn test_file_backed_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let backend = SqliteBackend::new(&path).unwrap();
            backend.put("session/s1", "marker").unwrap();
        }

        let backend = SqliteBackend::new(&path).unwrap();
        assert_eq!(
            backend.get("session/s1").unwrap(),
            Some("marker".to_string())
        );
    }
}
