//! Append-only JSONL journal of ingest outcomes.
//!
//! Every ingestion appends one event. `orphaned` events name off-chain entries
//! that were stored but never anchored; [`orphaned_blobs`] lists the ones that
//! were not later re-anchored.

use crate::core::error::LogchainError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Anchored,
    Orphaned,
    StoreFailed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnchorEvent {
    pub ts: String,
    pub event_id: String,
    pub op: String,
    pub source: String,
    pub blob_id: Option<i64>,
    pub transaction_id: Option<String>,
    pub status: AnchorStatus,
    pub detail: Option<String>,
}

impl AnchorEvent {
    pub fn new(op: &str, source: &str, status: AnchorStatus) -> Self {
        Self {
            ts: time::rfc3339(&time::now_utc()),
            event_id: time::new_event_id(),
            op: op.to_string(),
            source: source.to_string(),
            blob_id: None,
            transaction_id: None,
            status,
            detail: None,
        }
    }
}

pub struct AnchorJournal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AnchorJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AnchorEvent) -> Result<(), LogchainError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LogchainError::ConfigError("journal lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }

    /// Read all events; a missing journal is empty. Malformed lines are skipped.
    pub fn read_events(&self) -> Result<Vec<AnchorEvent>, LogchainError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(ev) = serde_json::from_str::<AnchorEvent>(&line) {
                events.push(ev);
            }
        }
        Ok(events)
    }

    /// Off-chain ids whose latest recorded outcome is `orphaned`.
    pub fn orphaned_blobs(&self) -> Result<Vec<i64>, LogchainError> {
        let mut orphaned = BTreeSet::new();
        for ev in self.read_events()? {
            let Some(blob_id) = ev.blob_id else { continue };
            match ev.status {
                AnchorStatus::Orphaned => {
                    orphaned.insert(blob_id);
                }
                AnchorStatus::Anchored => {
                    orphaned.remove(&blob_id);
                }
                AnchorStatus::StoreFailed => {}
            }
        }
        Ok(orphaned.into_iter().collect())
    }
}
