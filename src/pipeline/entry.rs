//! Records that flow through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::time;

/// One tailed line as stored off-chain. `id` is zero until the store assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEntry {
    #[serde(rename = "ID")]
    pub id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl LogEntry {
    /// Build an unsaved entry stamped with the current UTC instant.
    pub fn new(content: &str, source: &str) -> Self {
        Self {
            id: 0,
            content: content.trim_end().to_string(),
            timestamp: time::now_utc(),
            source: source.to_string(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogEntry[ID={}, Content={}, Timestamp={}]",
            self.id,
            self.content,
            time::canonical(&self.timestamp)
        )
    }
}

/// On-ledger record. Field order is alphabetic so every encoder emits the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    #[serde(rename = "BlobPath")]
    pub blob_path: String,
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "LogID")]
    pub log_id: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl Anchor {
    /// Off-chain id named by `blob_path`, if it is numeric.
    pub fn blob_id(&self) -> Option<i64> {
        self.blob_path.trim().parse().ok()
    }
}

/// Read-side join of an anchor with its off-chain content.
///
/// When the content could not be resolved, `content` is empty, `timestamp` is
/// `None`, `is_valid` is false and `error` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetailedLogEntry {
    #[serde(rename = "ID")]
    pub id: Option<i64>,
    #[serde(rename = "LogID")]
    pub log_id: String,
    pub blob_path: String,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub source: String,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}
