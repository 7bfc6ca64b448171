use logchain::core::config::LogchainConfig;
use logchain::core::error::LogchainError;
use logchain::pipeline::Pipeline;
use logchain::pipeline::gateway::{Gateway, LogsQuery, SetPathRequest, WatchSupervisor};
use logchain::pipeline::watcher::{self, WatchState};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const WAIT: Duration = Duration::from_secs(5);

fn append(path: &Path, data: &str) {
    let mut f = OpenOptions::new().append(true).open(path).expect("open");
    f.write_all(data.as_bytes()).expect("write");
    f.sync_all().expect("sync");
}

fn collect(rx: &Receiver<String>, n: usize) -> Vec<String> {
    (0..n)
        .map(|_| rx.recv_timeout(WAIT).expect("line delivered"))
        .collect()
}

#[test]
fn only_appended_lines_are_delivered() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("app.log");
    fs::write(&path, "old 1\nold 2\n").expect("seed");

    let (tx, rx) = mpsc::channel();
    let mut handle = watcher::watch_file(&path, move |line| {
        let _ = tx.send(line.to_string());
    })
    .expect("watch");

    append(&path, "new 1\n");
    append(&path, "new 2\nnew 3\n");
    assert_eq!(collect(&rx, 3), vec!["new 1", "new 2", "new 3"]);

    handle.stop().expect("stop");
    assert_eq!(handle.state(), WatchState::Stopped);
}

#[test]
fn partial_line_waits_for_newline() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("app.log");
    fs::write(&path, "").expect("seed");

    let (tx, rx) = mpsc::channel();
    let _handle = watcher::watch_file(&path, move |line| {
        let _ = tx.send(line.to_string());
    })
    .expect("watch");

    append(&path, "half a ");
    assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    append(&path, "line\n");
    assert_eq!(collect(&rx, 1), vec!["half a line"]);
}

#[test]
fn supervisor_keeps_old_watch_on_bad_path_and_swaps_on_good() {
    let tmp = tempdir().expect("tempdir");
    let first = tmp.path().join("first.log");
    let second = tmp.path().join("second.log");
    fs::write(&first, "").expect("seed");
    fs::write(&second, "").expect("seed");

    let supervisor = WatchSupervisor::new();
    let (tx, rx) = mpsc::channel::<String>();

    let first_tx = tx.clone();
    supervisor
        .replace(&first, move |line| {
            let _ = first_tx.send(format!("first:{line}"));
        })
        .expect("watch first");

    let err = supervisor
        .replace(&tmp.path().join("missing.log"), |_| {})
        .expect_err("missing path");
    assert!(matches!(err, LogchainError::InvalidPath(_)));
    assert_eq!(supervisor.current_path().as_deref(), Some(first.as_path()));

    append(&first, "still watched\n");
    assert_eq!(collect(&rx, 1), vec!["first:still watched"]);

    let second_tx = tx.clone();
    supervisor
        .replace(&second, move |line| {
            let _ = second_tx.send(format!("second:{line}"));
        })
        .expect("watch second");
    assert_eq!(supervisor.current_path().as_deref(), Some(second.as_path()));

    append(&first, "ignored\n");
    append(&second, "picked up\n");
    assert_eq!(collect(&rx, 1), vec!["second:picked up"]);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    supervisor.stop().expect("stop");
    assert_eq!(supervisor.current_path(), None);
}

#[test]
fn gateway_anchors_lines_from_watched_file() {
    let tmp = tempdir().expect("tempdir");
    let log = tmp.path().join("service.log");
    fs::write(&log, "before start\n").expect("seed");

    let mut config = LogchainConfig::rooted_at(tmp.path());
    config.ingest.source = "svc".to_string();
    let gateway = Gateway::new(Pipeline::open(&config).expect("open"), &config);

    assert!(matches!(
        gateway.set_log_path(&SetPathRequest {
            path: "  ".to_string()
        }),
        Err(LogchainError::InvalidPath(_))
    ));

    let status = gateway
        .set_log_path(&SetPathRequest {
            path: log.display().to_string(),
        })
        .expect("set path");
    assert_eq!(status.status, "log path set");
    assert_eq!(gateway.log_path().path, log.display().to_string());

    append(&log, "first anchored line\n");

    let deadline = Instant::now() + WAIT;
    let logs = loop {
        let resp = gateway
            .logs(&LogsQuery {
                filter: Some("svc".to_string()),
                ..Default::default()
            })
            .expect("logs");
        if !resp.logs.is_empty() || Instant::now() > deadline {
            break resp.logs;
        }
        thread::sleep(Duration::from_millis(50));
    };

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].content, "first anchored line");
    assert!(logs[0].is_valid);
    gateway.shutdown().expect("shutdown");
}
