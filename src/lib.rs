//! logchain: tamper-evident anchoring for local log files
//!
//! Every line appended to a watched file is stored in an off-chain content
//! store, hashed, and the hash plus a pointer to the content is written to an
//! append-only ledger. Readers join each ledger record with its off-chain
//! content and recompute the hash, so any later edit to either side shows up
//! as an invalid entry rather than going unnoticed.
//!
//! # Architecture
//!
//! ## Write path
//!
//! `watcher` -> `ingest` -> { `offchain`, `ledger` }
//!
//! Content is stored first. A failed anchor leaves an orphaned off-chain entry,
//! recorded in the anchor journal and recoverable with `logchain reanchor`.
//!
//! ## Read path
//!
//! `reader` <- { `ledger`, `offchain`, `hasher` }
//!
//! Pages are cursor based. Whether another page exists is decided by a
//! one-record probe at the returned bookmark.
//!
//! # Examples
//!
//! ```bash
//! # Tail a file, anchoring each new line
//! logchain watch /var/log/app.log --source app
//!
//! # Page through what was anchored
//! logchain read --filter app --page-size 20
//!
//! # Re-verify everything
//! logchain verify
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: config, errors, SQLite helpers, journal, telemetry
//! - [`pipeline`]: hashing, stores, ledger client, ingest, read, watch

mod cli;
pub mod core;
pub mod pipeline;

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;

use cli::{Cli, Command};
use crate::core::config;
use crate::core::error::IngestError;
use crate::core::telemetry;
use crate::core::time;
use pipeline::Pipeline;
use pipeline::entry::DetailedLogEntry;
use pipeline::watcher;

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref()).context("loading configuration")?;
    telemetry::init(&config.telemetry);

    let pipeline = Pipeline::open(&config).with_context(|| {
        format!(
            "opening stores at {} and {}",
            config.store.path.display(),
            config.ledger.path.display()
        )
    })?;

    match cli.command {
        Command::Watch { file, source } => {
            let source = source.unwrap_or_else(|| config.ingest.source.clone());
            let ingestor = pipeline.ingestor.clone();
            let handle = watcher::watch_file(&file, move |line| {
                match ingestor.ingest(line, &source) {
                    Ok(anchored) => println!(
                        "Transaction committed successfully: {}",
                        anchored.entry
                    ),
                    Err(e) => tracing::error!(error = %e, "failed to write log"),
                }
            })?;
            println!("Watching {} (Ctrl-C to stop)", file.display());
            handle.wait()?;
        }
        Command::Write { line, source } => {
            let source = source.unwrap_or_else(|| config.ingest.source.clone());
            let anchored = pipeline.ingestor.ingest(&line, &source)?;
            println!(
                "Transaction {} committed: {}",
                anchored.commit.transaction_id, anchored.entry
            );
        }
        Command::Read {
            filter,
            page_size,
            bookmark,
            format,
        } => {
            let page_size = page_size.unwrap_or(config.reader.default_page_size);
            let page = pipeline.reader.read_page(&filter, page_size, &bookmark)?;
            if format == "json" {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "logs": page.entries,
                        "bookmark": page.bookmark,
                        "hasNextPage": page.has_next_page,
                    }))?
                );
            } else {
                print_entries(&page.entries);
                if page.has_next_page {
                    println!("Next page: --bookmark {}", page.bookmark);
                }
            }
        }
        Command::ReadAll { filter, format } => {
            let entries = pipeline.reader.read_all(&filter)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No logs found");
            } else {
                print_entries(&entries);
            }
        }
        Command::Verify { filter } => {
            let entries = pipeline.reader.read_all(&filter)?;
            let invalid: Vec<&DetailedLogEntry> =
                entries.iter().filter(|e| !e.is_valid).collect();
            for e in &invalid {
                println!("{} {} {}", "INVALID".red().bold(), e.log_id, reason(e));
            }
            if !invalid.is_empty() {
                bail!("{} of {} entries failed verification", invalid.len(), entries.len());
            }
            println!("{} {} entries verified", "OK".green().bold(), entries.len());
        }
        Command::Orphans => {
            let orphans = pipeline.journal.orphaned_blobs()?;
            if orphans.is_empty() {
                println!("No orphaned entries");
            }
            for id in orphans {
                println!("{id}");
            }
        }
        Command::Reanchor { blob_id } => {
            match pipeline.ingestor.reanchor(blob_id) {
                Ok(anchored) => println!(
                    "Re-anchored entry {} in transaction {}",
                    blob_id, anchored.commit.transaction_id
                ),
                Err(IngestError::AlreadyAnchored { log_id, .. }) => {
                    println!("Entry {} is already anchored as {}", blob_id, log_id)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

fn reason(entry: &DetailedLogEntry) -> &str {
    entry.error.as_deref().unwrap_or("content hash mismatch")
}

fn print_entries(entries: &[DetailedLogEntry]) {
    for e in entries {
        let valid = if e.is_valid {
            "true".green()
        } else {
            "false".red()
        };
        println!("LogID: {}", e.log_id);
        println!("Source: {}", e.source);
        if let Some(ts) = &e.timestamp {
            println!("Timestamp: {}", time::canonical(ts));
        }
        println!("BlobPath (DB ID): {}", e.blob_path);
        println!("Content: {}", e.content);
        println!("Content Hash Valid: {}", valid);
        if let Some(err) = &e.error {
            println!("Error: {}", err);
        }
        println!("-----------------------------------------------------");
    }
}
