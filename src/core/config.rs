//! Runtime configuration loaded from `logchain.toml`.
//!
//! A missing file yields defaults. `LOGCHAIN_STORE_PATH`, `LOGCHAIN_LEDGER_PATH`
//! and `LOGCHAIN_SOURCE` override the corresponding keys after parsing.

use crate::core::error::LogchainError;
use crate::core::schemas;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "logchain.toml";
pub const DEFAULT_DATA_DIR: &str = ".logchain";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SOURCE: &str = "gateway-client";

/// How the ledger derives the unique key of a new anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// `asset:<YYYYMMDDTHHMMSSZ>:<ULID>`; keys sort by transaction time.
    #[default]
    TimestampUlid,
    /// `asset:<blob_path>`; one anchor per off-chain entry.
    BlobPath,
    /// `asset:<transaction id>`.
    TransactionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Path::new(DEFAULT_DATA_DIR).join(schemas::LOGS_DB_NAME),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub key_policy: KeyPolicy,
    pub commit_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: Path::new(DEFAULT_DATA_DIR).join(schemas::LEDGER_DB_NAME),
            key_policy: KeyPolicy::default(),
            commit_timeout_ms: DEFAULT_COMMIT_TIMEOUT_MS,
        }
    }
}

impl LedgerConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub source: String,
    pub journal_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            journal_path: Path::new(DEFAULT_DATA_DIR).join("anchor.events.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub default_page_size: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogchainConfig {
    pub store: StoreConfig,
    pub ledger: LedgerConfig,
    pub ingest: IngestConfig,
    pub reader: ReaderConfig,
    pub telemetry: TelemetryConfig,
}

impl LogchainConfig {
    /// Defaults with every data file placed directly under `dir`.
    pub fn rooted_at(dir: &Path) -> Self {
        let mut config = Self::default();
        config.store.path = dir.join(schemas::LOGS_DB_NAME);
        config.ledger.path = dir.join(schemas::LEDGER_DB_NAME);
        config.ingest.journal_path = dir.join("anchor.events.jsonl");
        config
    }

    pub fn from_toml(content: &str) -> Result<Self, LogchainError> {
        let config: LogchainConfig =
            toml::from_str(content).map_err(|e| LogchainError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LogchainError> {
        if self.reader.default_page_size == 0 {
            return Err(LogchainError::ConfigError(
                "reader.default_page_size must be at least 1".to_string(),
            ));
        }
        if self.ledger.commit_timeout_ms == 0 {
            return Err(LogchainError::ConfigError(
                "ledger.commit_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.ingest.source.trim().is_empty() {
            return Err(LogchainError::ConfigError(
                "ingest.source must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(path) = env::var("LOGCHAIN_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("LOGCHAIN_LEDGER_PATH") {
            self.ledger.path = PathBuf::from(path);
        }
        if let Ok(source) = env::var("LOGCHAIN_SOURCE") {
            self.ingest.source = source;
        }
    }
}

/// Load config from `path`, or `./logchain.toml` when `path` is `None`.
///
/// An explicitly named file must exist; the implicit default may be absent.
pub fn load_config(path: Option<&Path>) -> Result<LogchainConfig, LogchainError> {
    let mut config = match path {
        Some(p) => {
            let content = fs::read_to_string(p).map_err(|e| {
                LogchainError::ConfigError(format!("cannot read {}: {}", p.display(), e))
            })?;
            toml::from_str(&content).map_err(|e| LogchainError::ConfigError(e.to_string()))?
        }
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                let content = fs::read_to_string(default_path)?;
                toml::from_str(&content)
                    .map_err(|e| LogchainError::ConfigError(e.to_string()))?
            } else {
                LogchainConfig::default()
            }
        }
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}
