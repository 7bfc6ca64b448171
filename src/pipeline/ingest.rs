//! Write path: store content off-chain, then anchor its hash on the ledger.
//!
//! The off-chain write always comes first. If it fails nothing is submitted.
//! If anchoring fails afterwards the entry stays durable but orphaned; the
//! error names its id and [`Ingestor::reanchor`] is the recovery path.

use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::{IngestError, LedgerError};
use crate::core::journal::{AnchorEvent, AnchorJournal, AnchorStatus};
use crate::pipeline::entry::{Anchor, LogEntry};
use crate::pipeline::hasher;
use crate::pipeline::ledger::{CREATE_ASSET, CommitStatus, GET_ALL_ASSETS, LedgerClient};
use crate::pipeline::offchain::LogStore;

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct Anchored {
    pub entry: LogEntry,
    pub hash: String,
    pub commit: CommitStatus,
    /// Anchor as endorsed by the ledger, when it returned one.
    pub anchor: Option<Anchor>,
}

pub struct Ingestor {
    store: Arc<dyn LogStore>,
    ledger: Arc<dyn LedgerClient>,
    journal: Option<Arc<AnchorJournal>>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn LogStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            store,
            ledger,
            journal: None,
        }
    }

    /// Record every outcome in `journal`.
    pub fn with_journal(mut self, journal: Arc<AnchorJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn ingest(&self, line: &str, source: &str) -> Result<Anchored, IngestError> {
        let mut entry = LogEntry::new(line, source);

        entry.id = match self.store.create(&entry) {
            Ok(id) => id,
            Err(err) => {
                warn!(source, error = %err, "off-chain write failed");
                self.record(
                    "ingest",
                    AnchorStatus::StoreFailed,
                    source,
                    None,
                    None,
                    Some(err.to_string()),
                );
                return Err(IngestError::Store(err));
            }
        };

        self.anchor(entry, "ingest")
    }

    /// Re-submit the anchor for an orphaned off-chain entry.
    ///
    /// An entry whose earlier anchor did land (e.g. after a commit timeout) is
    /// not anchored twice: the existing anchor is journaled and
    /// `AlreadyAnchored` returned.
    pub fn reanchor(&self, blob_id: i64) -> Result<Anchored, IngestError> {
        let entry = self.store.read_by_id(blob_id)?;
        let existing = self
            .existing_anchor(&entry)
            .map_err(|cause| IngestError::Orphaned { blob_id, cause })?;
        if let Some(anchor) = existing {
            info!(blob_id, log_id = %anchor.log_id, "entry already anchored, skipping");
            self.record(
                "reanchor",
                AnchorStatus::Anchored,
                &entry.source,
                Some(blob_id),
                None,
                Some(format!("already anchored as {}", anchor.log_id)),
            );
            return Err(IngestError::AlreadyAnchored {
                blob_id,
                log_id: anchor.log_id,
            });
        }
        self.anchor(entry, "reanchor")
    }

    /// Anchor on the ledger pointing at `entry`, if one was committed.
    fn existing_anchor(&self, entry: &LogEntry) -> Result<Option<Anchor>, LedgerError> {
        let raw = self
            .ledger
            .evaluate(GET_ALL_ASSETS, std::slice::from_ref(&entry.source))?;
        if raw.is_empty() {
            return Ok(None);
        }
        let anchors: Option<Vec<Anchor>> = serde_json::from_slice(&raw)
            .map_err(|e| LedgerError::QueryFailed(format!("malformed GetAllAssets result: {e}")))?;
        Ok(anchors
            .unwrap_or_default()
            .into_iter()
            .find(|a| a.blob_id() == Some(entry.id)))
    }

    fn anchor(&self, entry: LogEntry, op: &str) -> Result<Anchored, IngestError> {
        let hash = hasher::hash(&entry);
        let blob_path = entry.id.to_string();

        match self.submit_and_commit(&blob_path, &hash, &entry.source) {
            Ok((commit, anchor)) => {
                info!(
                    op,
                    blob_id = entry.id,
                    tx = %commit.transaction_id,
                    "anchored {}",
                    entry
                );
                self.record(
                    op,
                    AnchorStatus::Anchored,
                    &entry.source,
                    Some(entry.id),
                    Some(&commit.transaction_id),
                    None,
                );
                Ok(Anchored {
                    entry,
                    hash,
                    commit,
                    anchor,
                })
            }
            Err(cause) => {
                warn!(op, blob_id = entry.id, error = %cause, "entry stored but not anchored");
                let tx = match &cause {
                    LedgerError::CommitRejected { transaction_id, .. }
                    | LedgerError::CommitTimeout { transaction_id, .. } => {
                        Some(transaction_id.as_str())
                    }
                    _ => None,
                };
                self.record(
                    op,
                    AnchorStatus::Orphaned,
                    &entry.source,
                    Some(entry.id),
                    tx,
                    Some(cause.to_string()),
                );
                Err(IngestError::Orphaned {
                    blob_id: entry.id,
                    cause,
                })
            }
        }
    }

    fn submit_and_commit(
        &self,
        blob_path: &str,
        hash: &str,
        source: &str,
    ) -> Result<(CommitStatus, Option<Anchor>), LedgerError> {
        let args = [blob_path.to_string(), hash.to_string(), source.to_string()];
        let pending = self.ledger.submit(CREATE_ASSET, &args)?;
        let anchor = serde_json::from_slice::<Anchor>(&pending.result).ok();
        let commit = self.ledger.await_commit(pending)?;
        Ok((commit, anchor))
    }

    fn record(
        &self,
        op: &str,
        status: AnchorStatus,
        source: &str,
        blob_id: Option<i64>,
        tx: Option<&str>,
        detail: Option<String>,
    ) {
        let Some(journal) = &self.journal else { return };
        let mut ev = AnchorEvent::new(op, source, status);
        ev.blob_id = blob_id;
        ev.transaction_id = tx.map(str::to_string);
        ev.detail = detail;
        if let Err(e) = journal.append(&ev) {
            warn!(path = %journal.path().display(), error = %e, "failed to append anchor journal");
        }
    }
}
