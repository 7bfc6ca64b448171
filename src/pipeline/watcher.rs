//! Tail a growing file and hand each newly appended line to a callback.
//!
//! The watcher starts at the current end of file, so lines already present are
//! never delivered. A line is delivered only once its newline has been written.
//! Filesystem events and the stop request arrive on one channel, and the loop
//! blocks on it between events.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::core::error::WatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Watching,
    Stopped,
}

enum WatchMsg {
    Fs(notify::Result<Event>),
    Stop,
}

/// Incremental line reader over an append-only file.
pub struct LineTail {
    reader: BufReader<File>,
    pending: Vec<u8>,
    offset: u64,
}

impl LineTail {
    /// Open `path` positioned at its current end.
    pub fn open_at_end(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let offset = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader: BufReader::new(file),
            pending: Vec::new(),
            offset,
        })
    }

    /// Deliver every complete line appended since the last drain, in order.
    /// Returns the number of lines delivered.
    pub fn drain(&mut self, on_line: &mut dyn FnMut(&str)) -> io::Result<usize> {
        let len = self.reader.get_ref().metadata()?.len();
        if len < self.offset {
            debug!(len, offset = self.offset, "file truncated, skipping to end");
            self.offset = self.reader.seek(SeekFrom::End(0))?;
            self.pending.clear();
        }

        let mut delivered = 0;
        loop {
            let n = self.reader.read_until(b'\n', &mut self.pending)?;
            if n == 0 {
                break;
            }
            self.offset += n as u64;
            if self.pending.last() != Some(&b'\n') {
                // unterminated tail; keep it for the next drain
                break;
            }
            self.pending.pop();
            if self.pending.last() == Some(&b'\r') {
                self.pending.pop();
            }
            on_line(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
            delivered += 1;
        }
        Ok(delivered)
    }
}

/// A running watch. Dropping it stops the watcher.
pub struct WatchHandle {
    path: PathBuf,
    stop_tx: Sender<WatchMsg>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WatchState {
        if self.running.load(Ordering::SeqCst) {
            WatchState::Watching
        } else {
            WatchState::Stopped
        }
    }

    /// Signal the loop to exit and wait for it. Stopping twice is a no-op.
    pub fn stop(&mut self) -> Result<(), WatchError> {
        let _ = self.stop_tx.send(WatchMsg::Stop);
        self.join_thread()
    }

    /// Block until the loop exits on its own.
    pub fn wait(mut self) -> Result<(), WatchError> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<(), WatchError> {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| WatchError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn setup_failed(path: &Path, reason: impl ToString) -> WatchError {
    WatchError::SetupFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Start tailing `path` on a dedicated thread.
///
/// Fails with `SetupFailed` if the file or the filesystem watch cannot be
/// acquired; nothing is left running in that case.
pub fn watch_file<F>(path: &Path, on_line: F) -> Result<WatchHandle, WatchError>
where
    F: FnMut(&str) + Send + 'static,
{
    let tail = LineTail::open_at_end(path).map_err(|e| setup_failed(path, e))?;

    let (tx, rx) = mpsc::channel::<WatchMsg>();
    let fs_tx = tx.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = fs_tx.send(WatchMsg::Fs(res));
        },
        Config::default(),
    )
    .map_err(|e| setup_failed(path, e))?;
    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .map_err(|e| setup_failed(path, e))?;

    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let loop_path = path.to_path_buf();
    let thread = thread::Builder::new()
        .name("log-watcher".to_string())
        .spawn(move || {
            run_loop(&loop_path, watcher, tail, rx, on_line);
            loop_running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| setup_failed(path, e))?;

    info!(path = %path.display(), "watching for appended lines");
    Ok(WatchHandle {
        path: path.to_path_buf(),
        stop_tx: tx,
        running,
        thread: Some(thread),
    })
}

fn run_loop<F>(
    path: &Path,
    watcher: RecommendedWatcher,
    mut tail: LineTail,
    rx: Receiver<WatchMsg>,
    mut on_line: F,
) where
    F: FnMut(&str),
{
    // keeps the filesystem watch registered until the loop returns
    let _watcher = watcher;

    while let Ok(msg) = rx.recv() {
        match msg {
            WatchMsg::Stop => break,
            WatchMsg::Fs(Ok(event)) => {
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    continue;
                }
                match tail.drain(&mut on_line) {
                    Ok(0) => {}
                    Ok(n) => debug!(path = %path.display(), lines = n, "drained"),
                    Err(e) => warn!(path = %path.display(), error = %e, "read failed"),
                }
            }
            WatchMsg::Fs(Err(e)) => warn!(path = %path.display(), error = %e, "watch error"),
        }
    }
    info!(path = %path.display(), "watcher stopped");
}
