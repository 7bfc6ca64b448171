//! Ledger client contract.
//!
//! The pipeline talks to the anchoring ledger only through [`LedgerClient`]:
//! ordered submits that commit asynchronously, read-only evaluations, and a
//! paginated rich query filtered on `Source`.

pub mod contract;
pub mod local;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::LedgerError;
use crate::pipeline::entry::Anchor;

pub use local::LocalLedger;

pub const CREATE_ASSET: &str = "CreateAsset";
pub const GET_ALL_ASSETS: &str = "GetAllAssets";
pub const GET_ASSETS_WITH_FILTER: &str = "GetAssetsWithFilter";
pub const READ_ASSET: &str = "ReadAsset";

/// Final validation outcome of a transaction, numbered as the ledger reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxValidationCode {
    Valid,
    BadPayload,
    MvccReadConflict,
    InvalidOtherReason,
}

impl TxValidationCode {
    pub fn code(self) -> i32 {
        match self {
            TxValidationCode::Valid => 0,
            TxValidationCode::BadPayload => 2,
            TxValidationCode::MvccReadConflict => 11,
            TxValidationCode::InvalidOtherReason => 255,
        }
    }
}

impl fmt::Display for TxValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxValidationCode::Valid => "VALID",
            TxValidationCode::BadPayload => "BAD_PAYLOAD",
            TxValidationCode::MvccReadConflict => "MVCC_READ_CONFLICT",
            TxValidationCode::InvalidOtherReason => "INVALID_OTHER_REASON",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// Handle for a dispatched, not yet finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub transaction_id: String,
    /// Result returned by the contract when the transaction was endorsed.
    pub result: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStatus {
    pub successful: bool,
    pub transaction_id: String,
    pub code: TxValidationCode,
}

impl CommitStatus {
    /// Turn an unsuccessful outcome into [`LedgerError::CommitRejected`].
    pub fn ensure_committed(self) -> Result<CommitStatus, LedgerError> {
        if self.successful {
            Ok(self)
        } else {
            Err(LedgerError::CommitRejected {
                transaction_id: self.transaction_id,
                code: self.code.code(),
            })
        }
    }
}

/// Equality predicate on an anchor's `Source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub source: String,
}

impl Selector {
    pub fn source(source: &str) -> Self {
        Self {
            source: source.to_string(),
        }
    }

    /// Rich-query form, e.g. `{"selector":{"Source":"app"}}`.
    pub fn to_query(&self) -> String {
        serde_json::json!({ "selector": { "Source": self.source } }).to_string()
    }
}

/// One page of a selector query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryPage {
    pub records: Vec<Anchor>,
    pub fetched_count: u32,
    /// Opaque continuation token; resume with it to get the following records.
    pub bookmark: String,
}

/// Wire shape of `GetAssetsWithFilter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedQueryResult {
    pub records: Vec<Anchor>,
    pub fetched_records_count: u32,
    pub bookmark: String,
    pub has_next_page: bool,
}

pub trait LedgerClient: Send + Sync {
    /// Endorse and dispatch a transaction. Returns before it is committed.
    fn submit(&self, method: &str, args: &[String]) -> Result<PendingTransaction, LedgerError>;

    /// Block until `pending` is final.
    ///
    /// Fails with `CommitTimeout` once the client's bound, counted from
    /// submit, has passed and `CommitRejected` when the ledger reports the
    /// transaction invalid.
    fn await_commit(&self, pending: PendingTransaction) -> Result<CommitStatus, LedgerError>;

    /// Read-only query against current state.
    fn evaluate(&self, method: &str, args: &[String]) -> Result<Vec<u8>, LedgerError>;

    /// At most `page_size` anchors matching `selector`, resuming after `bookmark`
    /// (empty for the first page).
    ///
    /// Records come back in key order and the bookmark is the `log_id` of the
    /// last one, so any record's `log_id` is a valid resume point.
    fn query_paginated(
        &self,
        selector: &Selector,
        page_size: u32,
        bookmark: &str,
    ) -> Result<QueryPage, LedgerError>;
}
