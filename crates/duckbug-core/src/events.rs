//! Read, edit and delete individual events.
//!
//! Nothing here touches group rows: editing or deleting an event leaves its
//! group's `counter`, `first_seen_at` and `last_seen_at` as they were.

use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use serde::Deserialize;
use tracing::debug;

use crate::db::filter::{Page, Predicate, SortDirection, WhereClause};
use crate::error::{Error, Record, Result, storage};
use crate::model::{ErrorDetails, Event, EventBody, EventKind, LogLevel, RequestMeta};

const ERROR_COLUMNS: &str = "id, project_id, fingerprint, message, context, time, created_at, \
     updated_at, file, line, stacktrace, ip, url, method, headers, query_params, body_params, \
     cookies, session, files, env";

const LOG_COLUMNS: &str =
    "id, project_id, fingerprint, message, context, time, created_at, updated_at, level";

const fn columns(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Error => ERROR_COLUMNS,
        EventKind::Log => LOG_COLUMNS,
    }
}

/// Filters for event listings. Blank strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub project_id: Option<String>,
    pub fingerprint: Option<String>,
    /// Inclusive lower bound on `time` (unix ms).
    pub time_from: Option<i64>,
    /// Inclusive upper bound on `time` (unix ms).
    pub time_to: Option<i64>,
    /// Case-insensitive substring of `message`.
    pub search: Option<String>,
    /// Log events only.
    pub level: Option<LogLevel>,
    pub sort: SortDirection,
    pub page: Page,
}

impl EventQuery {
    fn where_clause(&self, kind: EventKind) -> Result<WhereClause> {
        if let (Some(from), Some(to)) = (self.time_from, self.time_to)
            && from > to
        {
            return Err(Error::invalid_filter(format!(
                "time range is empty: from {from} is after to {to}"
            )));
        }
        if self.level.is_some() && kind != EventKind::Log {
            return Err(Error::invalid_filter("level filter applies to log events only"));
        }

        Ok(WhereClause::new()
            .and_opt(Predicate::text_eq("project_id", self.project_id.as_deref()))
            .and_opt(Predicate::text_eq("fingerprint", self.fingerprint.as_deref()))
            .and_opt(self.time_from.map(|t| Predicate::Gte("time", Value::Integer(t))))
            .and_opt(self.time_to.map(|t| Predicate::Lte("time", Value::Integer(t))))
            .and_opt(Predicate::search("message", self.search.as_deref()))
            .and_opt(
                self.level
                    .map(|level| Predicate::Eq("level", Value::Text(level.as_str().into()))),
            ))
    }
}

/// Mutable event fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventPatch {
    pub fingerprint: Option<String>,
    pub message: Option<String>,
    pub context: Option<serde_json::Value>,
    /// Unix milliseconds.
    pub time: Option<i64>,
    /// Error events only.
    pub file: Option<String>,
    /// Error events only.
    pub line: Option<u32>,
    /// Error events only.
    pub stacktrace: Option<serde_json::Value>,
    /// Log events only.
    pub level: Option<LogLevel>,
}

impl EventPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fingerprint.is_none()
            && self.message.is_none()
            && self.context.is_none()
            && self.time.is_none()
            && self.file.is_none()
            && self.line.is_none()
            && self.stacktrace.is_none()
            && self.level.is_none()
    }

    fn assignments(&self, kind: EventKind) -> Result<Vec<(&'static str, Value)>> {
        let error_only = self.file.is_some() || self.line.is_some() || self.stacktrace.is_some();
        if error_only && kind != EventKind::Error {
            return Err(Error::invalid_filter(
                "file, line and stacktrace apply to error events only",
            ));
        }
        if self.level.is_some() && kind != EventKind::Log {
            return Err(Error::invalid_filter("level applies to log events only"));
        }
        if self.fingerprint.as_deref().is_some_and(|fp| fp.trim().is_empty()) {
            return Err(Error::missing("fingerprint"));
        }
        if self.file.as_deref().is_some_and(|file| file.trim().is_empty()) {
            return Err(Error::missing("file"));
        }

        let text = |v: &str| Value::Text(v.to_string());
        let json = |v: &serde_json::Value| Value::Text(v.to_string());
        let mut set = Vec::new();
        if let Some(fingerprint) = &self.fingerprint {
            set.push(("fingerprint", text(fingerprint)));
        }
        if let Some(message) = &self.message {
            set.push(("message", text(message)));
        }
        if let Some(context) = &self.context {
            set.push(("context", json(context)));
        }
        if let Some(time) = self.time {
            set.push(("time", Value::Integer(time)));
        }
        if let Some(file) = &self.file {
            set.push(("file", text(file)));
        }
        if let Some(line) = self.line {
            set.push(("line", Value::Integer(i64::from(line))));
        }
        if let Some(stacktrace) = &self.stacktrace {
            set.push(("stacktrace", json(stacktrace)));
        }
        if let Some(level) = self.level {
            set.push(("level", text(level.as_str())));
        }
        Ok(set)
    }
}

/// Event rows of both kinds.
#[derive(Debug, Clone, Copy)]
pub struct EventStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> EventStore<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Fetch one event.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no event has `id`; [`Error::Storage`] on
    /// query failure.
    pub fn get(&self, kind: EventKind, id: &str) -> Result<Event> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            columns(kind),
            kind.event_table()
        );
        self.conn
            .query_row(&sql, [id], |row| row_to_event(kind, row))
            .optional()
            .map_err(storage("get event"))?
            .ok_or_else(|| not_found(kind, id))
    }

    /// One page of events plus the total matching the filters.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an inverted time range or a level filter on
    /// error events; [`Error::Storage`] on query failure.
    pub fn list(&self, kind: EventKind, query: &EventQuery) -> Result<(Vec<Event>, u64)> {
        let (where_sql, params) = query.where_clause(kind)?.build();
        let sql = format!(
            "SELECT {} FROM {}{where_sql}{}{}",
            columns(kind),
            kind.event_table(),
            query.sort.order_by("time"),
            query.page.sql()
        );
        debug!(%kind, params = params.len(), "list events");

        let mut stmt = self.conn.prepare(&sql).map_err(storage("prepare list events"))?;
        let events = stmt
            .query_map(params_from_iter(params.iter()), |row| row_to_event(kind, row))
            .map_err(storage("list events"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("read event row"))?;

        let total = self.count(kind, query)?;
        Ok((events, total))
    }

    /// Number of events matching the filters (ignores sort and page).
    ///
    /// # Errors
    ///
    /// Same as [`Self::list`].
    pub fn count(&self, kind: EventKind, query: &EventQuery) -> Result<u64> {
        let (where_sql, params) = query.where_clause(kind)?.build();
        let sql = format!("SELECT COUNT(*) FROM {}{where_sql}", kind.event_table());
        self.conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(storage("count events"))
    }

    /// Apply `patch` to one event and bump its `updated_at`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the patch names a field the kind does not
    /// have or blanks a required field; [`Error::NotFound`] when no row has
    /// `id`; [`Error::Storage`] on write failure.
    pub fn update(&self, kind: EventKind, id: &str, patch: &EventPatch) -> Result<Event> {
        let mut set = patch.assignments(kind)?;
        set.push(("updated_at", Value::Integer(Utc::now().timestamp())));

        let mut params: Vec<Value> = Vec::with_capacity(set.len() + 1);
        let mut assignments = Vec::with_capacity(set.len());
        for (column, value) in set {
            params.push(value);
            assignments.push(format!("{column} = ?{}", params.len()));
        }
        params.push(Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            kind.event_table(),
            assignments.join(", "),
            params.len()
        );

        let changed = self
            .conn
            .execute(&sql, params_from_iter(params.iter()))
            .map_err(storage("update event"))?;
        if changed == 0 {
            return Err(not_found(kind, id));
        }
        debug!(%kind, id, "updated event");
        self.get(kind, id)
    }

    /// Remove one event. The group keeps its counter.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no row has `id`; [`Error::Storage`] on write
    /// failure.
    pub fn delete(&self, kind: EventKind, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", kind.event_table()),
                [id],
            )
            .map_err(storage("delete event"))?;
        if changed == 0 {
            return Err(not_found(kind, id));
        }
        debug!(%kind, id, "deleted event");
        Ok(())
    }
}

fn not_found(kind: EventKind, id: &str) -> Error {
    Error::NotFound {
        kind,
        record: Record::Event,
        id: id.to_string(),
    }
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
        })
        .transpose()
}

fn row_to_event(kind: EventKind, row: &Row<'_>) -> rusqlite::Result<Event> {
    let body = match kind {
        EventKind::Error => EventBody::Error(ErrorDetails {
            file: row.get(8)?,
            line: row.get(9)?,
            stacktrace: json_column(row, 10)?,
            request: RequestMeta {
                ip: row.get(11)?,
                url: row.get(12)?,
                method: row.get(13)?,
                headers: json_column(row, 14)?,
                query_params: json_column(row, 15)?,
                body_params: json_column(row, 16)?,
                cookies: json_column(row, 17)?,
                session: json_column(row, 18)?,
                files: json_column(row, 19)?,
                env: json_column(row, 20)?,
            },
        }),
        EventKind::Log => EventBody::Log { level: row.get(8)? },
    };

    Ok(Event {
        id: row.get(0)?,
        project_id: row.get(1)?,
        fingerprint: row.get(2)?,
        message: row.get(3)?,
        context: json_column(row, 4)?,
        time: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        body,
    })
}
