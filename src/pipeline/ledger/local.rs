//! Embedded single-process ledger.
//!
//! Implements [`LedgerClient`] over a SQLite world state. `submit` endorses the
//! transaction against current state and queues its write set; a committer
//! thread applies queued writes in submission order and reports each outcome
//! back to the waiting `await_commit`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::config::{KeyPolicy, LedgerConfig};
use crate::core::db;
use crate::core::error::{LedgerError, LogchainError};
use crate::core::schemas;
use crate::core::time;
use crate::pipeline::ledger::contract::{self, TxContext, WriteSet};
use crate::pipeline::ledger::{
    CREATE_ASSET, CommitStatus, GET_ALL_ASSETS, GET_ASSETS_WITH_FILTER, LedgerClient,
    PendingTransaction, QueryPage, READ_ASSET, Selector, TxValidationCode,
};

/// Outcome channel of a submitted transaction that has not been awaited yet.
struct Waiter {
    submitted: Instant,
    outcome: Receiver<CommitStatus>,
}

struct CommitJob {
    transaction_id: String,
    write: WriteSet,
    reply: Sender<CommitStatus>,
}

pub struct LocalLedger {
    db_path: PathBuf,
    key_policy: KeyPolicy,
    commit_timeout: Duration,
    queue: Option<Sender<CommitJob>>,
    pending: Mutex<HashMap<String, Waiter>>,
    committer: Option<JoinHandle<()>>,
}

impl LocalLedger {
    pub fn open(config: &LedgerConfig) -> Result<Self, LogchainError> {
        Self::open_with(
            &config.path,
            config.key_policy,
            config.commit_timeout(),
            Duration::ZERO,
        )
    }

    /// Open with an artificial delay before every commit is applied.
    pub fn open_with(
        db_path: &Path,
        key_policy: KeyPolicy,
        commit_timeout: Duration,
        commit_delay: Duration,
    ) -> Result<Self, LogchainError> {
        db::initialize_db(
            db_path,
            &[schemas::WORLD_STATE_SCHEMA, schemas::WORLD_STATE_SOURCE_INDEX],
        )?;

        let (tx, rx) = mpsc::channel::<CommitJob>();
        let committer_path = db_path.to_path_buf();
        let committer = thread::Builder::new()
            .name("ledger-committer".to_string())
            .spawn(move || run_committer(&committer_path, rx, commit_delay))?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            key_policy,
            commit_timeout,
            queue: Some(tx),
            pending: Mutex::new(HashMap::new()),
            committer: Some(committer),
        })
    }

    pub fn key_policy(&self) -> KeyPolicy {
        self.key_policy
    }

    /// Transactions submitted but neither awaited nor expired.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn pending(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Waiter>>, LedgerError> {
        self.pending
            .lock()
            .map_err(|_| LedgerError::Unavailable("pending transaction map poisoned".to_string()))
    }
}

fn run_committer(db_path: &Path, jobs: Receiver<CommitJob>, delay: Duration) {
    for job in jobs {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let code = match db::db_connect(db_path)
            .map_err(LedgerError::from)
            .and_then(|mut conn| contract::apply(&mut conn, &job.write))
        {
            Ok(code) => code,
            Err(err) => {
                warn!(tx = %job.transaction_id, error = %err, "commit failed");
                TxValidationCode::InvalidOtherReason
            }
        };
        debug!(tx = %job.transaction_id, key = %job.write.key, %code, "transaction final");
        let _ = job.reply.send(CommitStatus {
            successful: code == TxValidationCode::Valid,
            transaction_id: job.transaction_id,
            code,
        });
    }
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> Result<&'a str, LedgerError> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| LedgerError::InvalidArguments(format!("missing argument {name}")))
}

fn expect_arity(method: &str, args: &[String], n: usize) -> Result<(), LedgerError> {
    if args.len() != n {
        return Err(LedgerError::InvalidArguments(format!(
            "{} expects {} arguments, got {}",
            method,
            n,
            args.len()
        )));
    }
    Ok(())
}

impl LedgerClient for LocalLedger {
    fn submit(&self, method: &str, args: &[String]) -> Result<PendingTransaction, LedgerError> {
        if method != CREATE_ASSET {
            return Err(LedgerError::InvalidArguments(format!(
                "unknown transaction {method}"
            )));
        }
        expect_arity(method, args, 3)?;

        let ctx = TxContext {
            transaction_id: time::next_ulid().to_string().to_lowercase(),
            timestamp: time::now_utc(),
        };
        let conn = db::db_connect(&self.db_path)?;
        let (anchor, write) = contract::create_asset(
            &conn,
            &ctx,
            self.key_policy,
            arg(args, 0, "blobPath")?,
            arg(args, 1, "hash")?,
            arg(args, 2, "source")?,
        )?;

        let (reply_tx, reply_rx) = mpsc::channel();
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| LedgerError::Unavailable("ledger is shut down".to_string()))?;
        queue
            .send(CommitJob {
                transaction_id: ctx.transaction_id.clone(),
                write,
                reply: reply_tx,
            })
            .map_err(|_| LedgerError::Unavailable("committer stopped".to_string()))?;
        let mut pending = self.pending()?;
        // an outcome nobody collected within the commit timeout can no longer be awaited
        pending.retain(|_, w| w.submitted.elapsed() < self.commit_timeout);
        pending.insert(
            ctx.transaction_id.clone(),
            Waiter {
                submitted: Instant::now(),
                outcome: reply_rx,
            },
        );
        drop(pending);

        let result = serde_json::to_vec(&anchor)
            .map_err(|e| LedgerError::InvalidArguments(e.to_string()))?;
        Ok(PendingTransaction {
            transaction_id: ctx.transaction_id,
            result,
        })
    }

    fn await_commit(&self, pending: PendingTransaction) -> Result<CommitStatus, LedgerError> {
        let waiter = self
            .pending()?
            .remove(&pending.transaction_id)
            .ok_or_else(|| {
                LedgerError::InvalidArguments(format!(
                    "unknown or expired transaction {}",
                    pending.transaction_id
                ))
            })?;

        let remaining = self.commit_timeout.saturating_sub(waiter.submitted.elapsed());
        match waiter.outcome.recv_timeout(remaining) {
            Ok(status) => status.ensure_committed(),
            Err(RecvTimeoutError::Timeout) => Err(LedgerError::CommitTimeout {
                transaction_id: pending.transaction_id,
                timeout_ms: self.commit_timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(LedgerError::Unavailable(
                "committer dropped the transaction".to_string(),
            )),
        }
    }

    fn evaluate(&self, method: &str, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        let conn = db::db_connect(&self.db_path)?;
        let encoded = match method {
            GET_ALL_ASSETS => {
                let filter = args.first().map(String::as_str).unwrap_or("");
                serde_json::to_vec(&contract::get_all_assets(&conn, filter)?)
            }
            GET_ASSETS_WITH_FILTER => {
                expect_arity(method, args, 3)?;
                let page_size: u32 = arg(args, 1, "pageSize")?.parse().map_err(|_| {
                    LedgerError::InvalidArguments(format!("invalid pageSize {:?}", args[1]))
                })?;
                let result = contract::get_assets_with_filter(
                    &conn,
                    arg(args, 0, "source")?,
                    page_size,
                    arg(args, 2, "bookmark")?,
                )?;
                serde_json::to_vec(&result)
            }
            READ_ASSET => {
                expect_arity(method, args, 1)?;
                let key = arg(args, 0, "key")?;
                let asset = contract::read_asset(&conn, key)?
                    .ok_or_else(|| LedgerError::QueryFailed(format!("the asset {key} does not exist")))?;
                serde_json::to_vec(&asset)
            }
            other => {
                return Err(LedgerError::InvalidArguments(format!(
                    "unknown query {other}"
                )));
            }
        };
        encoded.map_err(|e| LedgerError::QueryFailed(e.to_string()))
    }

    fn query_paginated(
        &self,
        selector: &Selector,
        page_size: u32,
        bookmark: &str,
    ) -> Result<QueryPage, LedgerError> {
        let conn = db::db_connect(&self.db_path)?;
        contract::query_page(&conn, &selector.source, page_size, bookmark)
    }
}

impl Drop for LocalLedger {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(handle) = self.committer.take() {
            let _ = handle.join();
        }
    }
}
