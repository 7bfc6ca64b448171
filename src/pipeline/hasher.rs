//! Deterministic content hashing of log entries.
//!
//! Fields are concatenated in [`HASH_FIELDS`] order, timestamp first in the
//! canonical fixed-width UTC form, and the bytes are digested with SHA-256.
//! Any implementation following the same order reproduces the same hex digest.

use sha2::{Digest, Sha256};
use std::borrow::Cow;

use crate::core::time;
use crate::pipeline::entry::LogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashField {
    Timestamp,
    Id,
    Content,
    Source,
}

pub const HASH_FIELDS: [HashField; 4] = [
    HashField::Timestamp,
    HashField::Id,
    HashField::Content,
    HashField::Source,
];

fn field_text(entry: &LogEntry, field: HashField) -> Cow<'_, str> {
    match field {
        HashField::Timestamp => Cow::Owned(time::canonical(&entry.timestamp)),
        HashField::Id => Cow::Owned(entry.id.to_string()),
        HashField::Content => Cow::Borrowed(&entry.content),
        HashField::Source => Cow::Borrowed(&entry.source),
    }
}

/// The exact string fed to the digest.
pub fn canonical_text(entry: &LogEntry) -> String {
    HASH_FIELDS
        .iter()
        .map(|f| field_text(entry, *f))
        .collect::<Vec<_>>()
        .concat()
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text);
    format!("{:x}", hasher.finalize())
}

/// Lowercase hex SHA-256 of the entry's canonical text.
pub fn hash(entry: &LogEntry) -> String {
    hash_text(&canonical_text(entry))
}

pub fn verify(entry: &LogEntry, expected: &str) -> bool {
    hash(entry) == expected
}
