//! The log-anchoring pipeline.
//!
//! - [`entry`]: off-chain entries, on-ledger anchors, verified read results
//! - [`hasher`]: canonical SHA-256 over an entry's declared fields
//! - [`offchain`]: content store (SQLite, in-memory)
//! - [`ledger`]: ledger client contract and the embedded ledger
//! - [`ingest`]: write path
//! - [`reader`]: paginated and full-scan read path with re-verification
//! - [`watcher`]: file tailing that feeds the write path
//! - [`gateway`]: watch-target ownership and the request surface

pub mod entry;
pub mod gateway;
pub mod hasher;
pub mod ingest;
pub mod ledger;
pub mod offchain;
pub mod reader;
pub mod watcher;

use std::sync::Arc;

use crate::core::config::LogchainConfig;
use crate::core::error::LogchainError;
use crate::core::journal::AnchorJournal;
use ingest::Ingestor;
use ledger::{LedgerClient, LocalLedger};
use offchain::{LogStore, SqliteLogStore};
use reader::Reader;

/// Write and read paths wired to the same stores.
pub struct Pipeline {
    pub store: Arc<dyn LogStore>,
    pub ledger: Arc<dyn LedgerClient>,
    pub journal: Arc<AnchorJournal>,
    pub ingestor: Arc<Ingestor>,
    pub reader: Reader,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn LogStore>,
        ledger: Arc<dyn LedgerClient>,
        journal: Arc<AnchorJournal>,
    ) -> Self {
        let ingestor = Ingestor::new(Arc::clone(&store), Arc::clone(&ledger))
            .with_journal(Arc::clone(&journal));
        let reader = Reader::new(Arc::clone(&store), Arc::clone(&ledger));
        Self {
            store,
            ledger,
            journal,
            ingestor: Arc::new(ingestor),
            reader,
        }
    }

    /// SQLite content store plus embedded ledger, as configured.
    pub fn open(config: &LogchainConfig) -> Result<Self, LogchainError> {
        let store = Arc::new(SqliteLogStore::open(&config.store.path)?);
        let ledger = Arc::new(LocalLedger::open(&config.ledger)?);
        let journal = Arc::new(AnchorJournal::new(&config.ingest.journal_path));
        Ok(Self::new(store, ledger, journal))
    }
}
