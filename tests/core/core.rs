use logchain::core::config::{self, KeyPolicy, LogchainConfig};
use logchain::core::db;
use logchain::core::error::LogchainError;
use logchain::core::journal::{AnchorEvent, AnchorJournal, AnchorStatus};
use logchain::core::schemas;
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

#[test]
fn explicit_config_file_is_loaded_and_validated() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("logchain.toml");
    fs::write(
        &path,
        r#"
        [store]
        path = "/srv/logchain/logs.db"

        [ledger]
        key_policy = "transaction-id"

        [reader]
        default_page_size = 25

        [telemetry]
        level = "debug"
        "#,
    )
    .expect("write config");

    let config = config::load_config(Some(&path)).expect("load");
    assert_eq!(config.store.path, std::path::Path::new("/srv/logchain/logs.db"));
    assert_eq!(config.ledger.key_policy, KeyPolicy::TransactionId);
    assert_eq!(config.reader.default_page_size, 25);
    assert_eq!(config.telemetry.level, "debug");
    assert_eq!(config.ingest.source, config::DEFAULT_SOURCE);
}

#[test]
fn invalid_config_file_is_a_config_error() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("logchain.toml");
    fs::write(&path, "[ledger]\ncommit_timeout_ms = 0\n").expect("write config");

    let err = config::load_config(Some(&path)).expect_err("zero timeout");
    assert!(matches!(err, LogchainError::ConfigError(_)));

    fs::write(&path, "[reader\n").expect("write config");
    let err = config::load_config(Some(&path)).expect_err("bad toml");
    assert!(matches!(err, LogchainError::ConfigError(_)));
}

#[test]
fn rooted_config_places_every_file_under_dir() {
    let tmp = tempdir().expect("tempdir");
    let config = LogchainConfig::rooted_at(tmp.path());
    assert!(config.store.path.starts_with(tmp.path()));
    assert!(config.ledger.path.starts_with(tmp.path()));
    assert!(config.ingest.journal_path.starts_with(tmp.path()));
    assert_ne!(config.store.path, config.ledger.path);
}

#[test]
fn schemas_initialize_idempotently() {
    let tmp = tempdir().expect("tempdir");
    let logs = tmp.path().join(schemas::LOGS_DB_NAME);
    let ledger = tmp.path().join(schemas::LEDGER_DB_NAME);

    for _ in 0..2 {
        db::initialize_db(&logs, &[schemas::LOG_ENTRIES_SCHEMA]).expect("logs schema");
        db::initialize_db(
            &ledger,
            &[schemas::WORLD_STATE_SCHEMA, schemas::WORLD_STATE_SOURCE_INDEX],
        )
        .expect("ledger schema");
    }

    let conn = db::db_connect(&ledger).expect("connect");
    let index_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_world_state_source'",
            [],
            |row| row.get(0),
        )
        .expect("index lookup");
    assert_eq!(index_count, 1);
}

#[test]
fn journal_concurrent_appends_stay_line_delimited() {
    let tmp = tempdir().expect("tempdir");
    let journal = Arc::new(AnchorJournal::new(tmp.path().join("anchor.events.jsonl")));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let journal = Arc::clone(&journal);
            thread::spawn(move || {
                for i in 0..25 {
                    let mut ev = AnchorEvent::new("ingest", "conc", AnchorStatus::Anchored);
                    ev.blob_id = Some(t * 100 + i);
                    journal.append(&ev).expect("append");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("join");
    }

    let events = journal.read_events().expect("read");
    assert_eq!(events.len(), 100);
    assert!(journal.orphaned_blobs().expect("orphans").is_empty());
}

#[test]
fn journal_skips_malformed_lines() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("anchor.events.jsonl");
    let journal = AnchorJournal::new(&path);

    let mut ev = AnchorEvent::new("ingest", "svc", AnchorStatus::Orphaned);
    ev.blob_id = Some(9);
    ev.transaction_id = Some("01hx".to_string());
    journal.append(&ev).expect("append");
    let mut raw = fs::read_to_string(&path).expect("read raw");
    raw.push_str("{not json\n\n");
    fs::write(&path, raw).expect("rewrite");

    let events = journal.read_events().expect("read");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, AnchorStatus::Orphaned);
    assert_eq!(journal.orphaned_blobs().expect("orphans"), vec![9]);
}
