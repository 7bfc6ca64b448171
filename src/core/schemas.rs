//! Centralized SQLite schema definitions.
//!
//! Two databases back a local deployment:
//! 1. logs.db: off-chain log content, keyed by an auto-assigned id.
//! 2. ledger.db: world state of the embedded ledger, keyed by anchor key.

// --- 1. Off-chain content ---
pub const LOGS_DB_NAME: &str = "logs.db";

pub const LOG_ENTRIES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS log_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        source TEXT NOT NULL
    )
";

// --- 2. Ledger world state ---
pub const LEDGER_DB_NAME: &str = "ledger.db";

pub const WORLD_STATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS world_state (
        key TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        value TEXT NOT NULL
    )
";
pub const WORLD_STATE_SOURCE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_world_state_source ON world_state(source, key)";
