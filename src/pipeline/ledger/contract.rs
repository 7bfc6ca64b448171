//! Asset contract executed against the embedded ledger's world state.
//!
//! World state is a key-ordered table of JSON-encoded [`Anchor`]s. Endorsement
//! (`create_asset`) computes a write set against current state; `apply` commits
//! it after re-checking that the key is still free.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::core::config::KeyPolicy;
use crate::core::error::LedgerError;
use crate::core::time;
use crate::pipeline::entry::Anchor;
use crate::pipeline::ledger::{PaginatedQueryResult, QueryPage, TxValidationCode};

const KEY_PREFIX: &str = "asset";

/// Identity of the transaction being endorsed.
#[derive(Debug, Clone)]
pub struct TxContext {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A single endorsed state write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSet {
    pub key: String,
    pub source: String,
    pub value: String,
}

/// Ledger key for a new anchor. Keys of successive submits sort in submit order.
///
/// Numeric blob paths are zero-padded so `asset:…10` sorts after `asset:…9`.
pub fn derive_key(policy: KeyPolicy, ctx: &TxContext, blob_path: &str) -> String {
    match policy {
        KeyPolicy::TimestampUlid => format!(
            "{}:{}:{}",
            KEY_PREFIX,
            time::key_stamp(&ctx.timestamp),
            time::next_ulid()
        ),
        KeyPolicy::BlobPath => match blob_path.trim().parse::<u64>() {
            Ok(id) => format!("{}:{:020}", KEY_PREFIX, id),
            Err(_) => format!("{}:{}", KEY_PREFIX, blob_path),
        },
        KeyPolicy::TransactionId => format!("{}:{}", KEY_PREFIX, ctx.transaction_id),
    }
}

pub fn asset_exists(conn: &Connection, key: &str) -> Result<bool, LedgerError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM world_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Endorse `CreateAsset(blob_path, hash, source)`.
pub fn create_asset(
    conn: &Connection,
    ctx: &TxContext,
    policy: KeyPolicy,
    blob_path: &str,
    hash: &str,
    source: &str,
) -> Result<(Anchor, WriteSet), LedgerError> {
    if blob_path.is_empty() {
        return Err(LedgerError::InvalidArguments("blob path is empty".to_string()));
    }
    if hash.is_empty() {
        return Err(LedgerError::InvalidArguments("hash is empty".to_string()));
    }

    let key = derive_key(policy, ctx, blob_path);
    if asset_exists(conn, &key)? {
        return Err(LedgerError::AssetExists(key));
    }

    let anchor = Anchor {
        blob_path: blob_path.to_string(),
        hash: hash.to_string(),
        log_id: key.clone(),
        source: source.to_string(),
        timestamp: time::rfc3339_nanos(&ctx.timestamp),
    };
    let value = serde_json::to_string(&anchor)
        .map_err(|e| LedgerError::InvalidArguments(e.to_string()))?;

    Ok((
        anchor,
        WriteSet {
            key,
            source: source.to_string(),
            value,
        },
    ))
}

/// Commit an endorsed write. A key written since endorsement invalidates it.
pub fn apply(conn: &mut Connection, write: &WriteSet) -> Result<TxValidationCode, LedgerError> {
    let tx = conn.transaction()?;
    if asset_exists(&tx, &write.key)? {
        return Ok(TxValidationCode::MvccReadConflict);
    }
    tx.execute(
        "INSERT INTO world_state(key, source, value) VALUES(?1, ?2, ?3)",
        params![write.key, write.source, write.value],
    )?;
    tx.commit()?;
    Ok(TxValidationCode::Valid)
}

fn decode(value: &str) -> Result<Anchor, LedgerError> {
    serde_json::from_str(value).map_err(|e| LedgerError::QueryFailed(e.to_string()))
}

pub fn read_asset(conn: &Connection, key: &str) -> Result<Option<Anchor>, LedgerError> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM world_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    value.as_deref().map(decode).transpose()
}

/// Full range scan in key order, keeping assets whose source equals `source_filter`
/// (all of them when the filter is empty).
pub fn get_all_assets(conn: &Connection, source_filter: &str) -> Result<Vec<Anchor>, LedgerError> {
    let mut stmt = conn.prepare("SELECT value FROM world_state ORDER BY key")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut assets = Vec::new();
    for value in rows {
        let asset = decode(&value?)?;
        if source_filter.is_empty() || asset.source == source_filter {
            assets.push(asset);
        }
    }
    Ok(assets)
}

/// Up to `page_size` assets with `Source == source`, in key order after `bookmark`.
///
/// The returned bookmark is the last key of the page, or the given bookmark
/// when the page is empty.
pub fn query_page(
    conn: &Connection,
    source: &str,
    page_size: u32,
    bookmark: &str,
) -> Result<QueryPage, LedgerError> {
    if page_size == 0 {
        return Err(LedgerError::InvalidArguments(
            "page size must be at least 1".to_string(),
        ));
    }
    let mut stmt = conn.prepare(
        "SELECT key, value FROM world_state WHERE source = ?1 AND key > ?2 ORDER BY key LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![source, bookmark, i64::from(page_size)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut page = QueryPage {
        records: Vec::new(),
        fetched_count: 0,
        bookmark: bookmark.to_string(),
    };
    for row in rows {
        let (key, value) = row?;
        page.records.push(decode(&value)?);
        page.bookmark = key;
    }
    page.fetched_count = page.records.len() as u32;
    Ok(page)
}

/// `GetAssetsWithFilter`: one page plus a single-record probe for a further page.
pub fn get_assets_with_filter(
    conn: &Connection,
    source: &str,
    page_size: u32,
    bookmark: &str,
) -> Result<PaginatedQueryResult, LedgerError> {
    let page = query_page(conn, source, page_size, bookmark)?;
    let has_next_page = if page.bookmark.is_empty() {
        false
    } else {
        query_page(conn, source, 1, &page.bookmark)?.fetched_count > 0
    };
    Ok(PaginatedQueryResult {
        records: page.records,
        fetched_records_count: page.fetched_count,
        bookmark: page.bookmark,
        has_next_page,
    })
}
