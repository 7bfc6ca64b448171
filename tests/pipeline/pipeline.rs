use logchain::core::config::{KeyPolicy, LogchainConfig};
use logchain::core::error::{IngestError, LedgerError, LogchainError, StoreError};
use logchain::core::journal::{AnchorJournal, AnchorStatus};
use logchain::pipeline::Pipeline;
use logchain::pipeline::entry::{Anchor, LogEntry};
use logchain::pipeline::gateway::{Gateway, LogsQuery};
use logchain::pipeline::hasher;
use logchain::pipeline::ingest::Ingestor;
use logchain::pipeline::ledger::{
    CREATE_ASSET, CommitStatus, GET_ALL_ASSETS, LedgerClient, LocalLedger, PendingTransaction,
    QueryPage, Selector,
};
use logchain::pipeline::offchain::{LogStore, MemoryLogStore};
use logchain::pipeline::reader::Reader;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

fn local_ledger(dir: &Path) -> Arc<LocalLedger> {
    ledger_with(dir, KeyPolicy::TimestampUlid, Duration::from_secs(5), Duration::ZERO)
}

fn ledger_with(
    dir: &Path,
    policy: KeyPolicy,
    commit_timeout: Duration,
    commit_delay: Duration,
) -> Arc<LocalLedger> {
    Arc::new(
        LocalLedger::open_with(&dir.join("ledger.db"), policy, commit_timeout, commit_delay)
            .expect("open ledger"),
    )
}

fn memory_pipeline(dir: &Path) -> (Arc<MemoryLogStore>, Pipeline) {
    let store = Arc::new(MemoryLogStore::new());
    let journal = Arc::new(AnchorJournal::new(dir.join("anchor.events.jsonl")));
    let pipeline = Pipeline::new(store.clone(), local_ledger(dir), journal);
    (store, pipeline)
}

/// Ledger that endorses everything and rejects every commit.
struct RejectingLedger {
    submits: AtomicUsize,
}

impl LedgerClient for RejectingLedger {
    fn submit(&self, _method: &str, _args: &[String]) -> Result<PendingTransaction, LedgerError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(PendingTransaction {
            transaction_id: format!("tx-rejected-{n}"),
            result: Vec::new(),
        })
    }

    fn await_commit(&self, pending: PendingTransaction) -> Result<CommitStatus, LedgerError> {
        Err(LedgerError::CommitRejected {
            transaction_id: pending.transaction_id,
            code: 11,
        })
    }

    fn evaluate(&self, _method: &str, _args: &[String]) -> Result<Vec<u8>, LedgerError> {
        Ok(b"[]".to_vec())
    }

    fn query_paginated(
        &self,
        _selector: &Selector,
        _page_size: u32,
        bookmark: &str,
    ) -> Result<QueryPage, LedgerError> {
        Ok(QueryPage {
            bookmark: bookmark.to_string(),
            ..QueryPage::default()
        })
    }
}

/// Store whose every write fails.
struct BrokenStore;

impl LogStore for BrokenStore {
    fn create(&self, _entry: &LogEntry) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("disk detached".to_string()))
    }

    fn read_by_id(&self, id: i64) -> Result<LogEntry, StoreError> {
        Err(StoreError::NotFound(id))
    }
}

/// Ledger serving a fixed `GetAllAssets` result.
struct FixedLedger {
    anchors: Vec<Anchor>,
}

impl LedgerClient for FixedLedger {
    fn submit(&self, method: &str, _args: &[String]) -> Result<PendingTransaction, LedgerError> {
        Err(LedgerError::InvalidArguments(format!("read-only: {method}")))
    }

    fn await_commit(&self, pending: PendingTransaction) -> Result<CommitStatus, LedgerError> {
        Err(LedgerError::InvalidArguments(pending.transaction_id))
    }

    fn evaluate(&self, method: &str, _args: &[String]) -> Result<Vec<u8>, LedgerError> {
        assert_eq!(method, GET_ALL_ASSETS);
        Ok(serde_json::to_vec(&self.anchors).expect("encode"))
    }

    fn query_paginated(
        &self,
        _selector: &Selector,
        _page_size: u32,
        bookmark: &str,
    ) -> Result<QueryPage, LedgerError> {
        // page size ignored on purpose; the reader must enforce it
        let records: Vec<Anchor> = self
            .anchors
            .iter()
            .filter(|a| bookmark.is_empty() || a.log_id.as_str() > bookmark)
            .cloned()
            .collect();
        let bookmark = records
            .last()
            .map(|a| a.log_id.clone())
            .unwrap_or_else(|| bookmark.to_string());
        Ok(QueryPage {
            fetched_count: records.len() as u32,
            records,
            bookmark,
        })
    }
}

fn anchor_for(entry: &LogEntry, log_id: &str, timestamp: &str) -> Anchor {
    Anchor {
        blob_path: entry.id.to_string(),
        hash: hasher::hash(entry),
        log_id: log_id.to_string(),
        source: entry.source.clone(),
        timestamp: timestamp.to_string(),
    }
}

#[test]
fn written_line_reads_back_valid() {
    let tmp = tempdir().expect("tempdir");
    let pipeline = Pipeline::open(&LogchainConfig::rooted_at(tmp.path())).expect("open");

    let anchored = pipeline.ingestor.ingest("hello\n", "test").expect("ingest");
    assert!(anchored.commit.successful);
    assert_eq!(anchored.entry.content, "hello");
    assert_eq!(anchored.hash, hasher::hash(&anchored.entry));
    let anchor = anchored.anchor.expect("endorsed anchor");
    assert_eq!(anchor.blob_path, anchored.entry.id.to_string());
    assert_eq!(anchor.source, "test");

    let page = pipeline.reader.read_page("test", 10, "").expect("read");
    assert_eq!(page.entries.len(), 1);
    let entry = &page.entries[0];
    assert_eq!(entry.content, "hello");
    assert_eq!(entry.source, "test");
    assert_eq!(entry.log_id, anchor.log_id);
    assert!(entry.is_valid);
    assert!(entry.error.is_none());
    assert!(!page.has_next_page);
}

#[test]
fn filter_selects_exact_source() {
    let tmp = tempdir().expect("tempdir");
    let pipeline = Pipeline::open(&LogchainConfig::rooted_at(tmp.path())).expect("open");
    for (line, source) in [("one", "a"), ("two", "b"), ("three", "b")] {
        pipeline.ingestor.ingest(line, source).expect("ingest");
    }

    let page = pipeline.reader.read_page("b", 10, "").expect("read");
    assert_eq!(page.entries.len(), 2);
    assert!(page.entries.iter().all(|e| e.source == "b" && e.is_valid));
    assert!(pipeline.reader.read_page("ab", 10, "").expect("read").entries.is_empty());

    assert_eq!(pipeline.reader.read_all("").expect("all").len(), 3);
    assert_eq!(pipeline.reader.read_all("a").expect("all a").len(), 1);
}

#[test]
fn exactly_page_size_records_has_no_next_page() {
    let tmp = tempdir().expect("tempdir");
    let pipeline = Pipeline::open(&LogchainConfig::rooted_at(tmp.path())).expect("open");
    for i in 0..3 {
        pipeline.ingestor.ingest(&format!("line {i}"), "p").expect("ingest");
    }

    let page = pipeline.reader.read_page("p", 3, "").expect("read");
    assert_eq!(page.entries.len(), 3);
    assert!(!page.has_next_page);
}

#[test]
fn one_more_than_page_size_pages_twice() {
    let tmp = tempdir().expect("tempdir");
    let pipeline = Pipeline::open(&LogchainConfig::rooted_at(tmp.path())).expect("open");
    for i in 0..4 {
        pipeline.ingestor.ingest(&format!("line {i}"), "p").expect("ingest");
    }

    let first = pipeline.reader.read_page("p", 3, "").expect("first");
    assert_eq!(first.entries.len(), 3);
    assert!(first.has_next_page);

    let second = pipeline.reader.read_page("p", 3, &first.bookmark).expect("second");
    assert_eq!(second.entries.len(), 1);
    assert!(!second.has_next_page);

    let mut ids: Vec<i64> = first
        .entries
        .iter()
        .chain(second.entries.iter())
        .filter_map(|e| e.id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[test]
fn zero_page_size_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    let pipeline = Pipeline::open(&LogchainConfig::rooted_at(tmp.path())).expect("open");
    assert!(matches!(
        pipeline.reader.read_page("p", 0, ""),
        Err(LogchainError::InvalidPageSize(0))
    ));
}

#[test]
fn oversized_ledger_page_is_truncated_without_losing_records() {
    let store = Arc::new(MemoryLogStore::new());
    let mut anchors = Vec::new();
    for i in 0..5 {
        let mut entry = LogEntry::new(&format!("e{i}"), "s");
        entry.id = store.create(&entry).expect("create");
        anchors.push(anchor_for(&entry, &format!("asset:{i}"), "2024-01-01T00:00:00Z"));
    }
    let reader = Reader::new(store, Arc::new(FixedLedger { anchors }));

    let mut seen = Vec::new();
    let mut bookmark = String::new();
    loop {
        let page = reader.read_page("s", 2, &bookmark).expect("read");
        assert!(page.entries.len() <= 2);
        seen.extend(page.entries.into_iter().map(|e| e.content));
        if !page.has_next_page {
            break;
        }
        bookmark = page.bookmark;
    }
    assert_eq!(seen, vec!["e0", "e1", "e2", "e3", "e4"]);
}

#[test]
fn tampered_content_is_flagged_invalid() {
    let tmp = tempdir().expect("tempdir");
    let (store, pipeline) = memory_pipeline(tmp.path());
    let kept = pipeline.ingestor.ingest("untouched", "t").expect("ingest");
    let edited = pipeline.ingestor.ingest("original", "t").expect("ingest");

    store
        .tamper(edited.entry.id, |e| e.content = "forged".to_string())
        .expect("tamper");

    let entries = pipeline.reader.read_all("t").expect("read all");
    assert_eq!(entries.len(), 2);
    let forged = entries
        .iter()
        .find(|e| e.id == Some(edited.entry.id))
        .expect("edited entry");
    assert!(!forged.is_valid);
    assert_eq!(forged.content, "forged");
    assert!(forged.error.is_none());
    let clean = entries
        .iter()
        .find(|e| e.id == Some(kept.entry.id))
        .expect("kept entry");
    assert!(clean.is_valid);
}

#[test]
fn anchor_without_content_is_kept_and_flagged() {
    let tmp = tempdir().expect("tempdir");
    let (_store, pipeline) = memory_pipeline(tmp.path());
    pipeline.ingestor.ingest("present", "m").expect("ingest");

    let pending = pipeline
        .ledger
        .submit(
            CREATE_ASSET,
            &["999".to_string(), "deadbeef".to_string(), "m".to_string()],
        )
        .expect("submit");
    pipeline.ledger.await_commit(pending).expect("commit");

    let page = pipeline.reader.read_page("m", 10, "").expect("read");
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.invalid_count(), 1);
    let missing = page
        .entries
        .iter()
        .find(|e| e.blob_path == "999")
        .expect("missing entry");
    assert!(!missing.is_valid);
    assert!(missing.content.is_empty());
    assert!(missing.timestamp.is_none());
    assert!(missing.error.as_deref().unwrap_or("").contains("999"));
}

#[test]
fn read_all_orders_by_timestamp_and_keeps_ties_stable() {
    let store = Arc::new(MemoryLogStore::new());
    let mut entries = Vec::new();
    for content in ["late", "tie-a", "tie-b"] {
        let mut entry = LogEntry::new(content, "s");
        entry.id = store.create(&entry).expect("create");
        entries.push(entry);
    }
    let anchors = vec![
        anchor_for(&entries[0], "asset:late", "2024-01-01T00:00:09Z"),
        anchor_for(&entries[1], "asset:a", "2024-01-01T00:00:01Z"),
        anchor_for(&entries[2], "asset:b", "2024-01-01T00:00:01Z"),
    ];
    let reader = Reader::new(store, Arc::new(FixedLedger { anchors }));

    let read = reader.read_all("").expect("read all");
    let order: Vec<&str> = read.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(order, vec!["tie-a", "tie-b", "late"]);
    assert!(read.iter().all(|e| e.is_valid));
}

#[test]
fn empty_ledger_reads_empty() {
    let reader = Reader::new(
        Arc::new(MemoryLogStore::new()),
        Arc::new(FixedLedger { anchors: vec![] }),
    );
    assert!(reader.read_all("").expect("read all").is_empty());
}

#[test]
fn store_failure_submits_nothing() {
    let tmp = tempdir().expect("tempdir");
    let ledger = Arc::new(RejectingLedger {
        submits: AtomicUsize::new(0),
    });
    let journal = Arc::new(AnchorJournal::new(tmp.path().join("j.jsonl")));
    let ingestor =
        Ingestor::new(Arc::new(BrokenStore), ledger.clone()).with_journal(journal.clone());

    let err = ingestor.ingest("lost", "s").expect_err("store down");
    assert!(matches!(err, IngestError::Store(StoreError::Unavailable(_))));
    assert_eq!(err.orphaned_blob(), None);
    assert_eq!(ledger.submits.load(Ordering::SeqCst), 0);

    let events = journal.read_events().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, AnchorStatus::StoreFailed);
}

#[test]
fn rejected_commit_orphans_then_reanchor_recovers() {
    let tmp = tempdir().expect("tempdir");
    let store = Arc::new(MemoryLogStore::new());
    let journal = Arc::new(AnchorJournal::new(tmp.path().join("anchor.events.jsonl")));

    let rejecting = Ingestor::new(
        store.clone(),
        Arc::new(RejectingLedger {
            submits: AtomicUsize::new(0),
        }),
    )
    .with_journal(journal.clone());

    let err = rejecting.ingest("stranded", "s").expect_err("rejected");
    let blob_id = err.orphaned_blob().expect("orphaned id");
    match &err {
        IngestError::Orphaned {
            cause:
                LedgerError::CommitRejected {
                    transaction_id,
                    code,
                },
            ..
        } => {
            assert_eq!(transaction_id, "tx-rejected-0");
            assert_eq!(*code, 11);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(store.read_by_id(blob_id).expect("still stored").content, "stranded");
    assert_eq!(journal.orphaned_blobs().expect("orphans"), vec![blob_id]);
    let orphan_event = journal
        .read_events()
        .expect("events")
        .into_iter()
        .find(|e| e.status == AnchorStatus::Orphaned)
        .expect("orphan event");
    assert_eq!(orphan_event.transaction_id.as_deref(), Some("tx-rejected-0"));

    let ledger = local_ledger(tmp.path());
    let healthy = Ingestor::new(store.clone(), ledger.clone()).with_journal(journal.clone());
    let anchored = healthy.reanchor(blob_id).expect("reanchor");
    assert_eq!(anchored.entry.id, blob_id);
    assert!(journal.orphaned_blobs().expect("orphans").is_empty());

    let reader = Reader::new(store, ledger);
    let entries = reader.read_all("s").expect("read all");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_valid);
}

#[test]
fn reanchor_of_unknown_blob_is_not_found() {
    let tmp = tempdir().expect("tempdir");
    let (_store, pipeline) = memory_pipeline(tmp.path());
    assert!(matches!(
        pipeline.ingestor.reanchor(77),
        Err(IngestError::Store(StoreError::NotFound(77)))
    ));
}

#[test]
fn gateway_lists_logs_and_validates_requests() {
    let tmp = tempdir().expect("tempdir");
    let config = LogchainConfig::rooted_at(tmp.path());
    let pipeline = Pipeline::open(&config).expect("open");
    for i in 0..3 {
        pipeline
            .ingestor
            .ingest(&format!("g{i}"), "gw")
            .expect("ingest");
    }
    let gateway = Gateway::new(pipeline, &config);

    let resp = gateway
        .logs(&LogsQuery {
            filter: Some("gw".to_string()),
            page_size: Some(2),
            bookmark: None,
        })
        .expect("logs");
    assert_eq!(resp.logs.len(), 2);
    assert!(resp.has_next_page);

    let json = serde_json::to_value(&resp).expect("encode");
    assert!(json.get("hasNextPage").is_some());
    assert!(json["logs"][0].get("IsValid").is_some());

    let rest = gateway
        .logs(&LogsQuery {
            filter: Some("gw".to_string()),
            page_size: None,
            bookmark: Some(resp.bookmark.clone()),
        })
        .expect("logs");
    assert_eq!(rest.logs.len(), 1);
    assert!(!rest.has_next_page);

    for bad in [0, -5] {
        assert!(matches!(
            gateway.logs(&LogsQuery {
                page_size: Some(bad),
                ..LogsQuery::default()
            }),
            Err(LogchainError::InvalidPageSize(n)) if n == bad
        ));
    }
    assert_eq!(gateway.log_path().path, "");
}

#[test]
fn gateway_query_uses_wire_names() {
    let query: LogsQuery =
        serde_json::from_str(r#"{"filter":"x","pageSize":3,"bookmark":"k"}"#).expect("decode");
    assert_eq!(query.filter.as_deref(), Some("x"));
    assert_eq!(query.page_size, Some(3));
    assert_eq!(query.bookmark.as_deref(), Some("k"));
}

#[test]
fn reads_follow_insertion_order_under_every_key_policy() {
    for policy in [
        KeyPolicy::TimestampUlid,
        KeyPolicy::BlobPath,
        KeyPolicy::TransactionId,
    ] {
        let tmp = tempdir().expect("tempdir");
        let store = Arc::new(MemoryLogStore::new());
        let journal = Arc::new(AnchorJournal::new(tmp.path().join("anchor.events.jsonl")));
        let ledger = ledger_with(tmp.path(), policy, Duration::from_secs(5), Duration::ZERO);
        let pipeline = Pipeline::new(store, ledger, journal);

        let mut written = Vec::new();
        for i in 1..=12 {
            let anchored = pipeline
                .ingestor
                .ingest(&format!("line {i}"), "p")
                .expect("ingest");
            written.push(anchored.entry.id);
        }

        let all: Vec<i64> = pipeline
            .reader
            .read_all("p")
            .expect("read all")
            .iter()
            .filter_map(|e| e.id)
            .collect();
        assert_eq!(all, written, "read_all under {policy:?}");

        let mut paged = Vec::new();
        let mut bookmark = String::new();
        loop {
            let page = pipeline.reader.read_page("p", 5, &bookmark).expect("page");
            paged.extend(page.entries.iter().filter_map(|e| e.id));
            if !page.has_next_page {
                break;
            }
            bookmark = page.bookmark;
        }
        assert_eq!(paged, written, "read_page under {policy:?}");
    }
}

#[test]
fn reanchor_after_late_commit_does_not_duplicate() {
    let tmp = tempdir().expect("tempdir");
    let store = Arc::new(MemoryLogStore::new());
    let journal = Arc::new(AnchorJournal::new(tmp.path().join("anchor.events.jsonl")));
    let ledger = ledger_with(
        tmp.path(),
        KeyPolicy::TimestampUlid,
        Duration::from_millis(20),
        Duration::from_millis(200),
    );
    let pipeline = Pipeline::new(store, ledger, journal.clone());

    let err = pipeline.ingestor.ingest("once", "s").expect_err("times out");
    assert!(matches!(
        err,
        IngestError::Orphaned {
            cause: LedgerError::CommitTimeout { .. },
            ..
        }
    ));
    let blob_id = err.orphaned_blob().expect("orphaned id");
    assert_eq!(journal.orphaned_blobs().expect("orphans"), vec![blob_id]);

    // the committer still applies the write after the caller gave up
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while pipeline.reader.read_all("s").expect("read all").is_empty() {
        assert!(std::time::Instant::now() < deadline, "late commit never landed");
        std::thread::sleep(Duration::from_millis(20));
    }

    match pipeline.ingestor.reanchor(blob_id) {
        Err(IngestError::AlreadyAnchored { blob_id: id, log_id }) => {
            assert_eq!(id, blob_id);
            assert!(log_id.starts_with("asset:"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(journal.orphaned_blobs().expect("orphans").is_empty());

    let entries = pipeline.reader.read_all("s").expect("read all");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, Some(blob_id));
    assert!(entries[0].is_valid);
}
