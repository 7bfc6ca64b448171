//! Watch-target ownership and the gateway request surface.
//!
//! [`WatchSupervisor`] owns the one active watch. Replacing it happens under a
//! single lock: validate the new path, stop the old watcher, start the new one.
//! [`Gateway`] exposes the log-path and log-listing requests as typed methods
//! for whatever transport fronts them.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

use crate::core::config::LogchainConfig;
use crate::core::error::LogchainError;
use crate::pipeline::Pipeline;
use crate::pipeline::entry::DetailedLogEntry;
use crate::pipeline::ingest::Ingestor;
use crate::pipeline::reader::Reader;
use crate::pipeline::watcher::{self, WatchHandle};

#[derive(Default)]
pub struct WatchSupervisor {
    active: Mutex<Option<WatchHandle>>,
}

impl WatchSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<WatchHandle>>, LogchainError> {
        self.active
            .lock()
            .map_err(|_| LogchainError::ConfigError("watch supervisor lock poisoned".to_string()))
    }

    /// Switch the watch to `path`.
    ///
    /// An unreadable path is rejected and the current watch keeps running.
    pub fn replace<F>(&self, path: &Path, on_line: F) -> Result<(), LogchainError>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let mut active = self.lock()?;

        File::open(path)
            .map_err(|e| LogchainError::InvalidPath(format!("{}: {}", path.display(), e)))?;

        if let Some(mut old) = active.take() {
            info!(path = %old.path().display(), "stopping previous watcher");
            old.stop()?;
        }
        *active = Some(watcher::watch_file(path, on_line)?);
        Ok(())
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock()
            .ok()
            .and_then(|active| active.as_ref().map(|h| h.path().to_path_buf()))
    }

    pub fn stop(&self) -> Result<(), LogchainError> {
        if let Some(mut old) = self.lock()?.take() {
            old.stop()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPathRequest {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathResponse {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default, rename = "pageSize")]
    pub page_size: Option<i64>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<DetailedLogEntry>,
    pub bookmark: String,
    #[serde(rename = "hasNextPage")]
    pub has_next_page: bool,
}

pub struct Gateway {
    ingestor: Arc<Ingestor>,
    reader: Reader,
    supervisor: WatchSupervisor,
    source: String,
    default_page_size: u32,
}

impl Gateway {
    pub fn new(pipeline: Pipeline, config: &LogchainConfig) -> Self {
        Self {
            ingestor: pipeline.ingestor,
            reader: pipeline.reader,
            supervisor: WatchSupervisor::new(),
            source: config.ingest.source.clone(),
            default_page_size: config.reader.default_page_size,
        }
    }

    /// Point ingestion at a new file. Each appended line is ingested; failures
    /// are logged and the watcher keeps going.
    pub fn set_log_path(&self, req: &SetPathRequest) -> Result<StatusResponse, LogchainError> {
        if req.path.trim().is_empty() {
            return Err(LogchainError::InvalidPath("path is required".to_string()));
        }
        let ingestor = Arc::clone(&self.ingestor);
        let source = self.source.clone();
        self.supervisor
            .replace(Path::new(&req.path), move |line| {
                match ingestor.ingest(line, &source) {
                    Ok(anchored) => info!(
                        blob_id = anchored.entry.id,
                        tx = %anchored.commit.transaction_id,
                        "wrote log entry to ledger"
                    ),
                    Err(e) => error!(error = %e, "failed to write log"),
                }
            })?;
        Ok(StatusResponse {
            status: "log path set".to_string(),
        })
    }

    pub fn log_path(&self) -> PathResponse {
        PathResponse {
            path: self
                .supervisor
                .current_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn logs(&self, query: &LogsQuery) -> Result<LogsResponse, LogchainError> {
        let page_size = match query.page_size {
            None => self.default_page_size,
            Some(n) if n <= 0 || n > i64::from(u32::MAX) => {
                return Err(LogchainError::InvalidPageSize(n));
            }
            Some(n) => n as u32,
        };
        let page = self.reader.read_page(
            query.filter.as_deref().unwrap_or(""),
            page_size,
            query.bookmark.as_deref().unwrap_or(""),
        )?;
        Ok(LogsResponse {
            logs: page.entries,
            bookmark: page.bookmark,
            has_next_page: page.has_next_page,
        })
    }

    pub fn shutdown(&self) -> Result<(), LogchainError> {
        self.supervisor.stop()
    }
}
