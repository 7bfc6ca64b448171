//! Shared primitives: configuration, errors, storage helpers, telemetry.

pub mod config;
pub mod db;
pub mod error;
pub mod journal;
pub mod schemas;
pub mod telemetry;
pub mod time;
