pub mod events;
pub mod groups;
pub mod ingest;
pub mod init;
pub mod overview;
pub mod stats;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use duckbug_core::config::EngineConfig;
use duckbug_core::db;
use rusqlite::Connection;
use std::path::PathBuf;

use crate::output::OutputMode;

/// Resolved settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: EngineConfig,
    pub store_path: PathBuf,
    pub output: OutputMode,
}

impl Context {
    /// Open the configured store, creating and migrating it on first use.
    pub fn open_store(&self) -> Result<Connection> {
        db::open_store(&self.store_path, self.config.store.busy_timeout())
            .with_context(|| format!("open store {}", self.store_path.display()))
    }
}

/// Parse an instant given as RFC 3339 or as unix seconds.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| format!("timestamp out of range: {raw}"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| format!("expected RFC 3339 or unix seconds, got '{raw}': {err}"))
}

/// Format a unix-seconds timestamp for human output.
pub fn format_secs(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Format a unix-milliseconds timestamp for human output.
pub fn format_millis(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms).map_or_else(
        || ms.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
    )
}
