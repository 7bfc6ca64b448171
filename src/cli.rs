//! CLI struct definitions for the `logchain` command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "logchain",
    version = env!("CARGO_PKG_VERSION"),
    about = "Anchor tamper-evident hashes of log lines on a ledger, keep the content off-chain."
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./logchain.toml when present).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Tail a file and anchor every appended line until interrupted
    Watch {
        /// File to tail; only lines appended after start are ingested.
        file: PathBuf,
        /// Source label recorded with each entry (defaults to ingest.source).
        #[clap(long)]
        source: Option<String>,
    },
    /// Anchor a single line and exit
    Write {
        line: String,
        #[clap(long)]
        source: Option<String>,
    },
    /// Read one page of anchored entries for a source
    Read {
        /// Exact source to match.
        #[clap(long, default_value = "")]
        filter: String,
        /// Entries per page (defaults to reader.default_page_size).
        #[clap(long)]
        page_size: Option<u32>,
        /// Continuation token from a previous page.
        #[clap(long, default_value = "")]
        bookmark: String,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Read every anchored entry, oldest first
    ReadAll {
        /// Exact source to match; empty for all sources.
        #[clap(long, default_value = "")]
        filter: String,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Re-verify every anchor; fails if any entry is invalid
    Verify {
        #[clap(long, default_value = "")]
        filter: String,
    },
    /// List off-chain entries that were stored but never anchored
    Orphans,
    /// Re-submit the anchor for an orphaned off-chain entry
    Reanchor {
        /// Off-chain entry id.
        blob_id: i64,
    },
}
