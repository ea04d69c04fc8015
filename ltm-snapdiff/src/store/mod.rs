//! Persistence of snapshots.
//!
//! A store only ever inserts whole snapshots: a snapshot is parsed in full
//! before [`SnapshotStore::insert`] is called, and the insert itself is one
//! transaction, so a failed backup leaves nothing behind.

mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::section::SectionParser;
use crate::snapshot::{BackupError, BackupRequest, Snapshot, SnapshotStatus};

pub use sqlite::{default_store_path, SqliteStore};

/// Errors raised by snapshot persistence.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode snapshot {id}: {source}")]
    Encode {
        id: String,
        source: serde_json::Error,
    },
    #[error("failed to decode snapshot {id}: {source}")]
    Decode {
        id: String,
        source: serde_json::Error,
    },
    #[error("snapshot not found: {0}")]
    NotFound(String),
    #[error("failed to prepare store directory {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("could not determine a data directory for the snapshot store")]
    NoDataDir,
    #[error("snapshot store lock poisoned")]
    Poisoned,
}

/// Selection applied by [`SnapshotStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only snapshots containing this device.
    pub device: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<SnapshotStatus>,
    pub author: Option<String>,
    pub limit: Option<usize>,
}

/// Durable snapshot storage.
pub trait SnapshotStore: Send + Sync {
    /// Persist a complete snapshot atomically.
    fn insert(&self, snapshot: &Snapshot) -> Result<(), StorageError>;

    fn get(&self, id: &str) -> Result<Snapshot, StorageError>;

    /// Snapshots matching `filter`, newest first.
    fn list(&self, filter: &ListFilter) -> Result<Vec<Snapshot>, StorageError>;

    fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Ids of snapshots created before `horizon`. Removal is left to the
    /// caller.
    fn expired(&self, horizon: DateTime<Utc>) -> Result<Vec<String>, StorageError>;

    /// Parse raw texts and persist the resulting snapshot.
    ///
    /// A parse failure returns before the store is touched.
    fn create(
        &self,
        parser: &SectionParser,
        request: BackupRequest,
    ) -> Result<Snapshot, BackupError> {
        let snapshot = Snapshot::capture(parser, request)?;
        self.insert(&snapshot)?;
        Ok(snapshot)
    }
}
