//! Off-chain content store.
//!
//! Holds the full text of each log entry under an auto-assigned id. The ledger
//! only ever sees that id (as `blob_path`) and the entry's hash.

use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::db;
use crate::core::error::{LogchainError, StoreError};
use crate::core::schemas;
use crate::core::time;
use crate::pipeline::entry::LogEntry;

/// Create/read-by-id contract of the off-chain store.
///
/// Implementations must hand out a distinct id to every successful `create`,
/// including concurrent ones.
pub trait LogStore: Send + Sync {
    /// Persist `entry` (its `id` is ignored) and return the assigned id.
    fn create(&self, entry: &LogEntry) -> Result<i64, StoreError>;

    fn read_by_id(&self, id: i64) -> Result<LogEntry, StoreError>;
}

/// SQLite-backed store. A fresh connection is opened per operation.
pub struct SqliteLogStore {
    db_path: PathBuf,
}

impl SqliteLogStore {
    /// Open the store at `db_path`, creating the schema if needed.
    pub fn open(db_path: &Path) -> Result<Self, LogchainError> {
        db::initialize_db(db_path, &[schemas::LOG_ENTRIES_SCHEMA])?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl LogStore for SqliteLogStore {
    fn create(&self, entry: &LogEntry) -> Result<i64, StoreError> {
        let mut conn = db::db_connect(&self.db_path)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO log_entries(content, timestamp, source) VALUES(?1, ?2, ?3)",
            params![entry.content, time::canonical(&entry.timestamp), entry.source],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    fn read_by_id(&self, id: i64) -> Result<LogEntry, StoreError> {
        let conn = db::db_connect(&self.db_path)?;
        let row = conn
            .query_row(
                "SELECT id, content, timestamp, source FROM log_entries WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, content, ts, source)) = row else {
            return Err(StoreError::NotFound(id));
        };
        let timestamp = time::parse_canonical(&ts).ok_or_else(|| {
            StoreError::Unavailable(format!("log entry {} has malformed timestamp {:?}", id, ts))
        })?;
        Ok(LogEntry {
            id,
            content,
            timestamp,
            source,
        })
    }
}

/// In-process store for tests and embedding.
#[derive(Default)]
pub struct MemoryLogStore {
    entries: Mutex<BTreeMap<i64, LogEntry>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a stored entry in place, bypassing the create-only contract.
    pub fn tamper(&self, id: i64, f: impl FnOnce(&mut LogEntry)) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(entry);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<i64, LogEntry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl LogStore for MemoryLogStore {
    fn create(&self, entry: &LogEntry) -> Result<i64, StoreError> {
        let mut entries = self.lock()?;
        let id = entries.keys().next_back().copied().unwrap_or(0) + 1;
        let mut stored = entry.clone();
        stored.id = id;
        entries.insert(id, stored);
        Ok(id)
    }

    fn read_by_id(&self, id: i64) -> Result<LogEntry, StoreError> {
        self.lock()?.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }
}
