use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

use super::{ListFilter, SnapshotStore, StorageError};
use crate::snapshot::Snapshot;

/// Default database location (`~/.local/share/ltm-snapdiff/snapshots.db` or
/// the platform equivalent).
pub fn default_store_path() -> Result<PathBuf, StorageError> {
    let dirs = directories::ProjectDirs::from("", "", "ltm-snapdiff").ok_or(StorageError::NoDataDir)?;
    Ok(dirs.data_dir().join("snapshots.db"))
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            author TEXT NOT NULL,
            comment TEXT,
            status TEXT NOT NULL,
            body TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshot_devices (
            snapshot_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            object_count INTEGER NOT NULL,
            PRIMARY KEY (snapshot_id, device_id),
            FOREIGN KEY(snapshot_id) REFERENCES snapshots(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_created_at ON snapshots(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshot_devices_device ON snapshot_devices(device_id)",
        [],
    )?;

    Ok(())
}

/// SQLite-backed snapshot store. One connection, serialized behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened snapshot store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl SnapshotStore for SqliteStore {
    fn insert(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let body = serde_json::to_string(snapshot).map_err(|source| StorageError::Encode {
            id: snapshot.id.clone(),
            source,
        })?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO snapshots (id, created_at, author, comment, status, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.id,
                snapshot.created_at.timestamp_millis(),
                snapshot.author,
                snapshot.comment.as_deref(),
                snapshot.status.as_str(),
                body
            ],
        )?;

        let mut stmt = tx.prepare_cached(
            "INSERT INTO snapshot_devices (snapshot_id, device_id, object_count)
             VALUES (?1, ?2, ?3)",
        )?;
        for device in &snapshot.devices {
            let count: usize = device.sections.iter().map(|s| s.len()).sum();
            stmt.execute(params![
                snapshot.id,
                device.device_id,
                i64::try_from(count).unwrap_or(i64::MAX)
            ])?;
        }

        drop(stmt);
        tx.commit()?;
        debug!(id = %snapshot.id, devices = snapshot.devices.len(), "stored snapshot");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Snapshot, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT body FROM snapshots WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => decode(id, &row.get::<_, String>(0)?),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Snapshot>, StorageError> {
        let mut sql = String::from("SELECT s.id, s.body FROM snapshots s");
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(device) = &filter.device {
            sql.push_str(" JOIN snapshot_devices d ON d.snapshot_id = s.id");
            clauses.push("d.device_id = ?");
            values.push(Value::Text(device.clone()));
        }
        if let Some(since) = filter.since {
            clauses.push("s.created_at >= ?");
            values.push(Value::Integer(since.timestamp_millis()));
        }
        if let Some(until) = filter.until {
            clauses.push("s.created_at <= ?");
            values.push(Value::Integer(until.timestamp_millis()));
        }
        if let Some(status) = filter.status {
            clauses.push("s.status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(author) = &filter.author {
            clauses.push("s.author = ?");
            values.push(Value::Text(author.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY s.created_at DESC, s.id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter().map(|(id, body)| decode(id, body)).collect()
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        debug!(id, "deleted snapshot");
        Ok(())
    }

    fn expired(&self, horizon: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM snapshots WHERE created_at < ?1 ORDER BY created_at ASC",
        )?;
        let ids = stmt
            .query_map(params![horizon.timestamp_millis()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn decode(id: &str, body: &str) -> Result<Snapshot, StorageError> {
    serde_json::from_str(body).map_err(|source| StorageError::Decode {
        id: id.to_string(),
        source,
    })
}
