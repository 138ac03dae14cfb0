//! Versioned schema migrations for the event store.

use super::schema;
use rusqlite::{Connection, types::Type};
use tracing::debug;

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[(1, schema::MIGRATION_V1_SQL), (2, schema::MIGRATION_V2_SQL)];

/// Read `PRAGMA user_version` as a `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the stored value is negative.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply every migration newer than `user_version`, each in its own
/// transaction. Re-running against an up-to-date store is a no-op.
///
/// # Errors
///
/// Returns an error if any migration fails; earlier migrations stay applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for &(version, sql) in MIGRATIONS {
        if version <= current {
            continue;
        }

        debug!(version, "applying store migration");
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(version))?;
        tx.execute(
            "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(version)],
        )?;
        tx.commit()?;
        current = version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, current_schema_version, migrate};
    use crate::db::schema;
    use rusqlite::{Connection, params};

    fn sqlite_object_exists(
        conn: &Connection,
        object_type: &str,
        object_name: &str,
    ) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
            params![object_type, object_name],
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        for table in ["error_groups", "log_groups", "errors", "logs", "store_meta"] {
            assert!(
                sqlite_object_exists(&conn, "table", table)?,
                "missing table {table}"
            );
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(
                sqlite_object_exists(&conn, "index", index)?,
                "missing expected index {index}"
            );
        }

        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);

        let meta_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM store_meta", [], |row| row.get(0))?;
        assert_eq!(meta_rows, 1);

        let recorded: i64 = conn.query_row(
            "SELECT schema_version FROM store_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(recorded, i64::from(LATEST_SCHEMA_VERSION));

        Ok(())
    }

    #[test]
    fn migrate_upgrades_from_v1_keeping_rows() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1_i64)?;
        conn.execute(
            "INSERT INTO log_groups (
                id, project_id, level, message, first_seen_at, last_seen_at, counter, status
             ) VALUES ('f1', 'p1', 'INFO', 'hello', 1, 2, 7, 'ignored')",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);

        let counter: i64 =
            conn.query_row("SELECT counter FROM log_groups WHERE id = 'f1'", [], |row| {
                row.get(0)
            })?;
        assert_eq!(counter, 7);
        assert!(sqlite_object_exists(
            &conn,
            "index",
            "idx_log_groups_project_status"
        )?);

        Ok(())
    }
}
