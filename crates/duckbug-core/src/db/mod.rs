//! SQLite event store utilities.
//!
//! Connections are configured for many concurrent workers sharing one file:
//! - `journal_mode = WAL` so readers proceed while a writer holds the lock
//! - `busy_timeout` (default 5s) so contending writers wait instead of failing
//! - `foreign_keys = ON` and `synchronous = NORMAL`
//! - the Unicode case-folding function used by search filters

pub mod filter;
pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::{path::Path, time::Duration};
use tracing::warn;

use crate::error::{self, Error};

/// Busy timeout used when the caller does not configure one.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the event store, apply runtime pragmas, and migrate the
/// schema to the latest version.
///
/// Each worker thread should open its own connection.
///
/// # Errors
///
/// Returns an error if opening, configuring, or migrating the database fails.
pub fn open_store(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open event store {}", path.display()))?;

    configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    Ok(conn)
}

/// Open a private in-memory store, fully migrated.
///
/// # Errors
///
/// Returns an error if SQLite cannot allocate the database or a migration
/// fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("configure sqlite pragmas")?;
    filter::register_functions(&conn).context("register sql functions")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    // Set first so the remaining pragmas wait out other workers' locks.
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    filter::register_functions(conn)
}

/// Begin a write-locking transaction on a shared connection.
///
/// `BEGIN IMMEDIATE` takes the database write lock up front, so concurrent
/// read-modify-write sequences on the same group serialise instead of
/// failing at commit time.
pub(crate) fn begin_immediate<'conn>(
    conn: &'conn Connection,
    op: &'static str,
) -> crate::error::Result<Transaction<'conn>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate).map_err(error::storage(op))
}

/// Roll back after a failed unit of work and hand back the original error.
pub(crate) fn abort(tx: Transaction<'_>, op: &'static str, err: Error) -> Error {
    if let Err(rollback_err) = tx.rollback() {
        warn!(op, error = %rollback_err, "rollback failed; connection drops the transaction");
    }
    err
}
