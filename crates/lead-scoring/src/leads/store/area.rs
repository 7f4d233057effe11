use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{AreaError, KeyValueArea};

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// In-process area with an optional byte quota over keys plus values.
#[derive(Debug, Default)]
pub struct MemoryArea {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Mutex<Option<usize>>,
}

impl MemoryArea {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Mutex::new(Some(quota_bytes)),
        }
    }

    pub fn set_quota(&self, quota_bytes: Option<usize>) {
        *self.quota_bytes.lock().expect("area quota mutex poisoned") = quota_bytes;
    }

    pub fn usage(&self) -> usize {
        self.entries
            .lock()
            .expect("area mutex poisoned")
            .iter()
            .map(|(key, value)| entry_size(key, value))
            .sum()
    }
}

impl KeyValueArea for MemoryArea {
    fn get(&self, key: &str) -> Result<Option<String>, AreaError> {
        let guard = self.entries.lock().expect("area mutex poisoned");
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AreaError> {
        let quota = *self.quota_bytes.lock().expect("area quota mutex poisoned");
        let mut guard = self.entries.lock().expect("area mutex poisoned");

        if let Some(quota) = quota {
            let used: usize = guard
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| entry_size(existing, stored))
                .sum();
            let requested = entry_size(key, value);
            let available = quota.saturating_sub(used);
            if requested > available {
                return Err(AreaError::QuotaExceeded {
                    requested,
                    available,
                });
            }
        }

        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AreaError> {
        self.entries
            .lock()
            .expect("area mutex poisoned")
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, AreaError> {
        let guard = self.entries.lock().expect("area mutex poisoned");
        Ok(guard.keys().cloned().collect())
    }
}

/// SQLite-backed area so profiles survive process restarts.
pub struct SqliteArea {
    conn: Mutex<Connection>,
    quota_bytes: Option<usize>,
}

impl SqliteArea {
    pub fn open(path: impl AsRef<Path>, quota_bytes: Option<usize>) -> Result<Self, AreaError> {
        let conn = Connection::open(path.as_ref()).map_err(unavailable)?;
        // WAL only applies to real files; ignore the pragma result elsewhere.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Self::from_connection(conn, quota_bytes)
    }

    pub fn in_memory(quota_bytes: Option<usize>) -> Result<Self, AreaError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::from_connection(conn, quota_bytes)
    }

    fn from_connection(conn: Connection, quota_bytes: Option<usize>) -> Result<Self, AreaError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_area (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(unavailable)?;

        Ok(Self {
            conn: Mutex::new(conn),
            quota_bytes,
        })
    }
}

fn unavailable(err: rusqlite::Error) -> AreaError {
    match err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::DiskFull =>
        {
            AreaError::QuotaExceeded {
                requested: 0,
                available: 0,
            }
        }
        other => AreaError::Unavailable(other.to_string()),
    }
}

impl KeyValueArea for SqliteArea {
    fn get(&self, key: &str) -> Result<Option<String>, AreaError> {
        let conn = self.conn.lock().expect("sqlite area mutex poisoned");
        conn.query_row(
            "SELECT value FROM kv_area WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AreaError> {
        let conn = self.conn.lock().expect("sqlite area mutex poisoned");

        if let Some(quota) = self.quota_bytes {
            let used: i64 = conn
                .query_row(
                    "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                     FROM kv_area WHERE key != ?1",
                    params![key],
                    |row| row.get(0),
                )
                .map_err(unavailable)?;
            let requested = entry_size(key, value);
            let available = quota.saturating_sub(used.max(0) as usize);
            if requested > available {
                return Err(AreaError::QuotaExceeded {
                    requested,
                    available,
                });
            }
        }

        conn.execute(
            "INSERT INTO kv_area (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AreaError> {
        let conn = self.conn.lock().expect("sqlite area mutex poisoned");
        conn.execute("DELETE FROM kv_area WHERE key = ?1", params![key])
            .map_err(unavailable)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, AreaError> {
        let conn = self.conn.lock().expect("sqlite area mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT key FROM kv_area ORDER BY key")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(unavailable)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(unavailable)
    }
}
