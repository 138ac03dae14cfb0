//! Occurrence counts over trailing 24-hour, 7-day and 30-day windows.
//!
//! Counts are computed on demand from event rows; nothing is cached. All
//! three thresholds derive from one `now` snapshot per call, so a single
//! result is internally consistent: `last_24h <= last_7d <= last_30d`.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::db::filter::{Predicate, WhereClause};
use crate::error::{Result, storage};
use crate::model::{EventKind, GroupStatus};

/// One day in milliseconds.
pub const DAY_MS: i64 = 86_400_000;

/// Event counts per trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCounts {
    pub last_24h: u64,
    pub last_7d: u64,
    pub last_30d: u64,
}

/// Lower bounds (inclusive, unix ms) of the three windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub from_24h: i64,
    pub from_7d: i64,
    pub from_30d: i64,
}

impl Thresholds {
    #[must_use]
    pub const fn at(now_ms: i64) -> Self {
        Self {
            from_24h: now_ms - DAY_MS,
            from_7d: now_ms - 7 * DAY_MS,
            from_30d: now_ms - 30 * DAY_MS,
        }
    }

    /// Bindings for `?1` and `?2` in [`WINDOW_SUMS`].
    fn window_params(self) -> Vec<Value> {
        vec![Value::Integer(self.from_24h), Value::Integer(self.from_7d)]
    }
}

/// Window sums over the rows selected by the caller's WHERE clause, which
/// carries the 30-day bound. Safe because the windows nest.
const WINDOW_SUMS: &str = "COALESCE(SUM(CASE WHEN time >= ?1 THEN 1 ELSE 0 END), 0), \
     COALESCE(SUM(CASE WHEN time >= ?2 THEN 1 ELSE 0 END), 0), \
     COUNT(*)";

/// Computes window counts and per-project group tallies.
#[derive(Debug, Clone, Copy)]
pub struct StatsAggregator<'conn> {
    conn: &'conn Connection,
}

impl<'conn> StatsAggregator<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Window counts for a project, optionally narrowed to one fingerprint.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Storage`] on query failure. An unknown project or
    /// fingerprint yields zeros.
    pub fn get_stats(
        &self,
        kind: EventKind,
        project_id: &str,
        fingerprint: Option<&str>,
    ) -> Result<WindowCounts> {
        self.get_stats_at(kind, project_id, fingerprint, Utc::now().timestamp_millis())
    }

    /// [`Self::get_stats`] against an explicit `now` (unix ms).
    ///
    /// # Errors
    ///
    /// [`crate::Error::Storage`] on query failure.
    pub fn get_stats_at(
        &self,
        kind: EventKind,
        project_id: &str,
        fingerprint: Option<&str>,
        now_ms: i64,
    ) -> Result<WindowCounts> {
        let t = Thresholds::at(now_ms);
        let fingerprint = fingerprint.map(str::trim).filter(|fp| !fp.is_empty());
        let (where_sql, params) = WhereClause::new()
            .and(Predicate::Eq("project_id", Value::Text(project_id.to_string())))
            .and(Predicate::Gte("time", Value::Integer(t.from_30d)))
            .and_opt(Predicate::text_eq("fingerprint", fingerprint))
            .build_after(t.window_params());
        let sql = format!("SELECT {WINDOW_SUMS} FROM {}{where_sql}", kind.event_table());
        debug!(%kind, project_id, ?fingerprint, "window stats");

        self.conn
            .query_row(&sql, params_from_iter(params.iter()), read_counts)
            .map_err(storage("window stats"))
    }

    /// Window counts for many projects in one grouped query.
    ///
    /// The result has exactly one entry per distinct requested id; projects
    /// without events map to zeros. An empty request returns an empty map
    /// without touching storage.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Storage`] on query failure.
    pub fn batch_get_stats(
        &self,
        kind: EventKind,
        project_ids: &[String],
    ) -> Result<HashMap<String, WindowCounts>> {
        self.batch_get_stats_at(kind, project_ids, Utc::now().timestamp_millis())
    }

    /// [`Self::batch_get_stats`] against an explicit `now` (unix ms).
    ///
    /// # Errors
    ///
    /// [`crate::Error::Storage`] on query failure.
    pub fn batch_get_stats_at(
        &self,
        kind: EventKind,
        project_ids: &[String],
        now_ms: i64,
    ) -> Result<HashMap<String, WindowCounts>> {
        let requested: BTreeSet<&str> = project_ids.iter().map(String::as_str).collect();
        let mut result: HashMap<String, WindowCounts> = requested
            .iter()
            .map(|id| ((*id).to_string(), WindowCounts::default()))
            .collect();
        if requested.is_empty() {
            return Ok(result);
        }

        let t = Thresholds::at(now_ms);
        let (where_sql, params) = WhereClause::new()
            .and(Predicate::InList(
                "project_id",
                requested
                    .iter()
                    .map(|id| Value::Text((*id).to_string()))
                    .collect(),
            ))
            .and(Predicate::Gte("time", Value::Integer(t.from_30d)))
            .build_after(t.window_params());
        let sql = format!(
            "SELECT project_id, {WINDOW_SUMS} FROM {}{where_sql} GROUP BY project_id",
            kind.event_table()
        );
        debug!(%kind, projects = requested.len(), "batch window stats");

        let mut stmt = self.conn.prepare(&sql).map_err(storage("prepare batch stats"))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    WindowCounts {
                        last_24h: row.get(1)?,
                        last_7d: row.get(2)?,
                        last_30d: row.get(3)?,
                    },
                ))
            })
            .map_err(storage("batch stats"))?;
        for row in rows {
            let (project_id, counts) = row.map_err(storage("read batch stats row"))?;
            result.insert(project_id, counts);
        }
        Ok(result)
    }

    /// Per-project number of groups currently in `status`, in one grouped
    /// query. Zero-filled like [`Self::batch_get_stats`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::Storage`] on query failure.
    pub fn batch_count_groups(
        &self,
        kind: EventKind,
        project_ids: &[String],
        status: GroupStatus,
    ) -> Result<HashMap<String, u64>> {
        let requested: BTreeSet<&str> = project_ids.iter().map(String::as_str).collect();
        let mut result: HashMap<String, u64> =
            requested.iter().map(|id| ((*id).to_string(), 0)).collect();
        if requested.is_empty() {
            return Ok(result);
        }

        let (where_sql, params) = WhereClause::new()
            .and(Predicate::Eq("status", Value::Text(status.as_str().into())))
            .and(Predicate::InList(
                "project_id",
                requested
                    .iter()
                    .map(|id| Value::Text((*id).to_string()))
                    .collect(),
            ))
            .build();
        let sql = format!(
            "SELECT project_id, COUNT(*) FROM {}{where_sql} GROUP BY project_id",
            kind.group_table()
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(storage("prepare group counts"))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })
            .map_err(storage("group counts"))?;
        for row in rows {
            let (project_id, count) = row.map_err(storage("read group count row"))?;
            result.insert(project_id, count);
        }
        Ok(result)
    }
}

fn read_counts(row: &rusqlite::Row<'_>) -> rusqlite::Result<WindowCounts> {
    Ok(WindowCounts {
        last_24h: row.get(0)?,
        last_7d: row.get(1)?,
        last_30d: row.get(2)?,
    })
}
