//! Shared timestamp/id helpers for deterministic encodings.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::sync::{LazyLock, Mutex};
use ulid::{Generator, Ulid};

static ULIDS: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Fixed-width UTC form with nanosecond precision, e.g. `2024-05-01T12:00:00.000000000Z`.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// Compact second-resolution form used in time-ordered ledger keys.
pub const KEY_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Render an instant in the canonical hashing/storage form.
pub fn canonical(ts: &DateTime<Utc>) -> String {
    ts.format(CANONICAL_FORMAT).to_string()
}

pub fn parse_canonical(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, CANONICAL_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// RFC3339 at second resolution with `Z` suffix. Lexicographic order matches time order.
pub fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// RFC3339 with fixed nine-digit fraction. Lexicographic order matches time order
/// down to the nanosecond.
pub fn rfc3339_nanos(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn key_stamp(ts: &DateTime<Utc>) -> String {
    ts.format(KEY_FORMAT).to_string()
}

pub fn new_event_id() -> String {
    next_ulid().to_string()
}

/// ULID strictly greater than every earlier one from this process.
///
/// Falls back to a fresh random ULID if the generator is poisoned or its
/// per-millisecond counter overflows.
pub fn next_ulid() -> Ulid {
    ULIDS
        .lock()
        .ok()
        .and_then(|mut generator| generator.generate().ok())
        .unwrap_or_else(Ulid::new)
}
