use std::io;
use thiserror::Error;

/// Failures of the off-chain content store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("off-chain store unavailable: {0}")]
    Unavailable(String),
    #[error("off-chain write failed: {0}")]
    WriteFailed(String),
    #[error("log entry {0} not found")]
    NotFound(i64),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::Unavailable(
                "query returned no rows outside of a keyed lookup".to_string(),
            ),
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::ConstraintViolation
                | ErrorCode::TooBig
                | ErrorCode::TypeMismatch
                | ErrorCode::ReadOnly => StoreError::WriteFailed(err.to_string()),
                _ => StoreError::Unavailable(err.to_string()),
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreError::WriteFailed(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Failures at the ledger boundary.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("the asset {0} already exists")]
    AssetExists(String),
    #[error("transaction {transaction_id} failed to commit with status: {code}")]
    CommitRejected { transaction_id: String, code: i32 },
    #[error("transaction {transaction_id} did not commit within {timeout_ms}ms")]
    CommitTimeout {
        transaction_id: String,
        timeout_ms: u64,
    },
    #[error("ledger query failed: {0}")]
    QueryFailed(String),
    #[error("invalid ledger arguments: {0}")]
    InvalidArguments(String),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Unavailable(err.to_string())
    }
}

/// Failures while acquiring a file watch.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to watch {path}: {reason}")]
    SetupFailed { path: String, reason: String },
    #[error("watcher thread panicked")]
    Panicked,
}

/// Failures of a single ingestion.
///
/// `Orphaned` means the content is durable off-chain under `blob_id` but no
/// anchor exists for it.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("off-chain write failed, nothing anchored: {0}")]
    Store(#[from] StoreError),
    #[error("log entry {blob_id} stored off-chain but not anchored: {cause}")]
    Orphaned {
        blob_id: i64,
        #[source]
        cause: LedgerError,
    },
    #[error("log entry {blob_id} is already anchored as {log_id}")]
    AlreadyAnchored { blob_id: i64, log_id: String },
}

impl IngestError {
    /// Off-chain id left without an anchor, if any.
    pub fn orphaned_blob(&self) -> Option<i64> {
        match self {
            IngestError::Orphaned { blob_id, .. } => Some(*blob_id),
            IngestError::Store(_) | IngestError::AlreadyAnchored { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum LogchainError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Invalid page size: {0}")]
    InvalidPageSize(i64),
    #[error("Invalid log path: {0}")]
    InvalidPath(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
