//! Read path: join ledger anchors with off-chain content and re-verify hashes.
//!
//! A record whose content cannot be resolved stays in the result with empty
//! content, `is_valid == false` and `error` set. It never fails the page.

use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::error::{LedgerError, LogchainError};
use crate::pipeline::entry::{Anchor, DetailedLogEntry};
use crate::pipeline::hasher;
use crate::pipeline::ledger::{GET_ALL_ASSETS, LedgerClient, Selector};
use crate::pipeline::offchain::LogStore;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    pub entries: Vec<DetailedLogEntry>,
    pub bookmark: String,
    pub has_next_page: bool,
}

impl Page {
    pub fn invalid_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_valid).count()
    }
}

pub struct Reader {
    store: Arc<dyn LogStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl Reader {
    pub fn new(store: Arc<dyn LogStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { store, ledger }
    }

    /// One page of anchors whose source equals `source_filter`, verified.
    ///
    /// `has_next_page` comes from a one-record probe at the returned bookmark.
    pub fn read_page(
        &self,
        source_filter: &str,
        page_size: u32,
        bookmark: &str,
    ) -> Result<Page, LogchainError> {
        if page_size == 0 {
            return Err(LogchainError::InvalidPageSize(0));
        }
        let selector = Selector::source(source_filter);
        let mut page = self.ledger.query_paginated(&selector, page_size, bookmark)?;
        if page.records.len() > page_size as usize {
            warn!(
                returned = page.records.len(),
                page_size, "ledger returned an oversized page, truncating"
            );
            page.records.truncate(page_size as usize);
            // resume right after the last record kept, not after the dropped ones
            if let Some(last) = page.records.last() {
                page.bookmark = last.log_id.clone();
            }
        }

        let has_next_page = self.probe(&selector, &page.bookmark)?;
        debug!(
            filter = source_filter,
            fetched = page.fetched_count,
            has_next_page,
            "read page"
        );

        Ok(Page {
            entries: self.join(&page.records),
            bookmark: page.bookmark,
            has_next_page,
        })
    }

    fn probe(&self, selector: &Selector, bookmark: &str) -> Result<bool, LedgerError> {
        if bookmark.is_empty() {
            return Ok(false);
        }
        let next = self.ledger.query_paginated(selector, 1, bookmark)?;
        Ok(!next.records.is_empty())
    }

    /// Every anchor (or those from `source_filter` when non-empty), oldest first.
    ///
    /// Anchors sharing a timestamp keep the ledger's iteration order.
    pub fn read_all(&self, source_filter: &str) -> Result<Vec<DetailedLogEntry>, LogchainError> {
        let mut anchors = self.fetch_all(source_filter)?;
        anchors.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(self.join(&anchors))
    }

    /// All anchors, filtered client-side by exact source match.
    pub fn fetch_all(&self, source_filter: &str) -> Result<Vec<Anchor>, LogchainError> {
        let raw = self
            .ledger
            .evaluate(GET_ALL_ASSETS, &[source_filter.to_string()])?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let anchors: Option<Vec<Anchor>> = serde_json::from_slice(&raw)
            .map_err(|e| LedgerError::QueryFailed(format!("malformed GetAllAssets result: {e}")))?;
        Ok(anchors
            .unwrap_or_default()
            .into_iter()
            .filter(|a| source_filter.is_empty() || a.source == source_filter)
            .collect())
    }

    fn join(&self, anchors: &[Anchor]) -> Vec<DetailedLogEntry> {
        anchors.par_iter().map(|a| self.verify_anchor(a)).collect()
    }

    /// Resolve `anchor` off-chain and compare the recomputed hash.
    pub fn verify_anchor(&self, anchor: &Anchor) -> DetailedLogEntry {
        let resolved = match anchor.blob_id() {
            Some(id) => self.store.read_by_id(id).map_err(|e| e.to_string()),
            None => Err(format!(
                "blob path {:?} is not an off-chain id",
                anchor.blob_path
            )),
        };

        match resolved {
            Ok(entry) => {
                let is_valid = hasher::verify(&entry, &anchor.hash);
                if !is_valid {
                    warn!(log_id = %anchor.log_id, blob_id = entry.id, "hash mismatch");
                }
                DetailedLogEntry {
                    id: Some(entry.id),
                    log_id: anchor.log_id.clone(),
                    blob_path: anchor.blob_path.clone(),
                    content: entry.content,
                    timestamp: Some(entry.timestamp),
                    source: entry.source,
                    is_valid,
                    error: None,
                }
            }
            Err(err) => {
                warn!(log_id = %anchor.log_id, blob_path = %anchor.blob_path, error = %err, "unresolved anchor");
                DetailedLogEntry {
                    id: anchor.blob_id(),
                    log_id: anchor.log_id.clone(),
                    blob_path: anchor.blob_path.clone(),
                    content: String::new(),
                    timestamp: None,
                    source: anchor.source.clone(),
                    is_valid: false,
                    error: Some(err),
                }
            }
        }
    }
}
